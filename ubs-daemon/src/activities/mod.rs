//! Activities known to the registry. Ping, file sharing and text documents run in-process;
//! everything else is an external command bound in the `[external]` config section.

mod external;
mod ping;
mod share;
mod text_files;

use std::sync::Arc;

use crate::config::Config;
use crate::lifecycle::Running;
use crate::registry::TaskRegistry;
use crate::sender::FileSender;

pub use external::ExternalActivity;
pub use ping::PingActivity;
pub use share::ShareActivity;
pub use text_files::TextFilesActivity;

pub const PING_TARGET_IPS: &str = "ping_target_ips";
pub const SHARE_FILES: &str = "share_files_with_network";
pub const CREATE_TEXT_FILES: &str = "create_text_files";

/// Task names served by external commands.
pub const EXTERNAL_TASKS: [&str; 8] = [
    "browse_websites",
    "watch_youtube",
    "download_media",
    "ftp_operations",
    "send_smtp_email",
    "ssh_operations",
    "run_random_applications",
    "imap_operations",
];

/// Build the fixed task table. In-process activities always rotate in random mode;
/// external ones only when bound and enabled.
pub fn build_registry(config: Arc<Config>, running: Running) -> TaskRegistry {
    let mut reg = TaskRegistry::new();
    reg.register(
        CREATE_TEXT_FILES,
        Arc::new(TextFilesActivity::new(config.clone(), running.clone())),
        true,
    );
    reg.register(
        SHARE_FILES,
        Arc::new(ShareActivity::new(
            config.clone(),
            FileSender::tcp(config.file_share_port),
            running.clone(),
        )),
        true,
    );
    reg.register(
        PING_TARGET_IPS,
        Arc::new(PingActivity::new(config.clone(), running.clone())),
        true,
    );
    for name in EXTERNAL_TASKS {
        let binding = config.external.get(name).cloned();
        let in_rotation = binding.as_ref().map_or(false, |b| b.enabled);
        reg.register(name, Arc::new(ExternalActivity::new(name, binding)), in_rotation);
    }
    reg
}
