// Startup module - displays banner and application status
//
// Shown once before the server starts:
// - Version info and branding
// - Configuration source
// - Registered pages and request dispatchers

use crate::app::Application;
use crate::config::{Config, VERSION};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const MAGENTA: &str = "\x1b[35m";
}

/// One line of the status list
pub struct ModuleStatus {
    pub name: String,
    pub enabled: bool,
    pub description: &'static str,
}

/// Print the startup banner
pub fn print_startup(config: &Config, app: &Application) {
    use colors::*;

    println!();
    println!("  {BOLD}{CYAN}trellis{RESET} {DIM}v{VERSION}{RESET}");
    println!("  {DIM}Component page framework{RESET}");
    println!();

    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("  {DIM}Config:{RESET} {GREEN}✓{RESET} {}", path.display());
        } else {
            println!("  {DIM}Config:{RESET} {DIM}(using defaults){RESET}");
        }
    }
    println!();

    println!("  {DIM}Pages{RESET}");
    for module in page_status(app) {
        print_module_status(&module);
    }
    println!();

    println!("  {DIM}Settings{RESET}");
    for module in settings_status(config) {
        print_module_status(&module);
    }
    println!();

    println!(
        "  {MAGENTA}▸{RESET} Listening on {BOLD}http://{}{}/{RESET}",
        config.bind_addr, config.context_path
    );
    if config.forms.hmac_passphrase.is_none() {
        println!("  {YELLOW}▸{RESET} {YELLOW}Form data is unsigned{RESET} {DIM}(set TRELLIS_HMAC_PASSPHRASE){RESET}");
    }
    println!();
}

fn page_status(app: &Application) -> Vec<ModuleStatus> {
    let mut names = app.services().pages.names();
    names.sort_unstable();
    let index = &app.services().links.settings().index_page_name;
    names
        .into_iter()
        .map(|name| ModuleStatus {
            enabled: true,
            description: if name.eq_ignore_ascii_case(index) {
                "index page"
            } else {
                "page"
            },
            name: name.to_string(),
        })
        .collect()
}

fn settings_status(config: &Config) -> Vec<ModuleStatus> {
    vec![
        ModuleStatus {
            name: "signing".to_string(),
            enabled: config.forms.hmac_passphrase.is_some(),
            description: "HMAC-signed form data",
        },
        ModuleStatus {
            name: "validation".to_string(),
            enabled: config.forms.client_validation,
            description: "Client-side validation attributes",
        },
        ModuleStatus {
            name: "relative".to_string(),
            enabled: !config.links.force_absolute_uris,
            description: "Relative link paths",
        },
        ModuleStatus {
            name: "file-log".to_string(),
            enabled: config.logging.file_enabled,
            description: "JSON log files",
        },
    ]
}

fn print_module_status(module: &ModuleStatus) {
    use colors::*;

    let (icon, style) = if module.enabled {
        (format!("{GREEN}✓{RESET}"), "")
    } else {
        (format!("{DIM}○{RESET}"), DIM)
    };

    println!(
        "    {icon} {style}{:<12}{RESET} {DIM}{}{RESET}",
        module.name, module.description
    );
}

/// The same status as log lines, for headless runs that only keep logs
pub fn log_startup(config: &Config, app: &Application) {
    tracing::info!("trellis v{}", VERSION);
    for module in page_status(app).iter().chain(settings_status(config).iter()) {
        let icon = if module.enabled { "✓" } else { "○" };
        tracing::info!("  {} {} - {}", icon, module.name, module.description);
    }
    tracing::info!("Dispatchers: {}", app.dispatcher_names().join(", "));
}
