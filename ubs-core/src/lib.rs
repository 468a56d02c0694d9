//! Activity scheduling and peer file-exchange core.
//! No I/O: the daemon supplies clocks, sockets and processes and feeds results in.

pub mod plan;
pub mod range;
pub mod schedule;
pub mod window;
pub mod wire;

pub use plan::{SharePolicy, Span};
pub use range::{IpRange, RangeError, Targets};
pub use schedule::{select_next, within_tolerance, DueTask, FiredLog, TaskDescriptor};
pub use window::ScheduleWindow;
pub use wire::{decode_header, encode_header, HeaderError, TransferHeader};
