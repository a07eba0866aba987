use log::debug;
use shell::Shell;
use utils::theme::Theme;

use crate::utils::config::Config;
use crate::utils::log::init_logger;

mod shell;
mod utils;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::new();
    init_logger(&config)?;
    debug!("configuration loaded, logs in {}", config.logger_dir.display());
    let theme = Theme::load_theme(&config.theme);

    let mut shell = Shell::new(&config, theme);
    shell.run()
}
