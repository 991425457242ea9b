pub mod connection;
pub mod headless;
pub mod session;

use serde::{Deserialize, Serialize};

pub use connection::connect_to_browser;
pub use headless::launch_browser;
pub use session::{ChromiumLauncher, ChromiumSession};

/// 浏览器启动参数（随 worker 载荷一起序列化）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserOptions {
    #[serde(default)]
    pub headful: bool,
    #[serde(default)]
    pub slow_mo_ms: u64,
    #[serde(default)]
    pub executable: Option<String>,
    /// 设置后连接已有浏览器
    #[serde(default)]
    pub debug_port: Option<u16>,
}

impl BrowserOptions {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            headful: config.headful,
            slow_mo_ms: config.slow_mo_ms,
            executable: config.chrome_executable.clone(),
            debug_port: config.browser_debug_port,
        }
    }
}
