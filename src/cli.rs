// CLI module - command-line argument parsing and handlers
//
// Subcommands:
// - serve (default): run the HTTP server
// - render <path>: run one request through the pipeline and print the response
// - pages: list registered pages
// - config --show|--path|--reset: configuration management

use crate::app::Application;
use crate::config::{Config, VERSION};
use crate::request::{Method, Request};
use clap::{Parser, Subcommand};
use std::io::Write;

/// trellis - component page framework server
#[derive(Parser)]
#[command(name = "trellis")]
#[command(version = VERSION)]
#[command(about = "Component-oriented page framework server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Run a single request through the pipeline and print the response
    Render {
        /// Path inside the application, e.g. /index or /entry/3
        path: String,

        /// Send a POST with these form fields (name=value)
        #[arg(long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,

        /// Mark the request as XHR
        #[arg(long)]
        xhr: bool,

        /// Print log output captured while handling the request
        #[arg(long)]
        logs: bool,
    },

    /// List registered pages
    Pages,

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

/// Build the request for `render` from a path that may carry a query string
pub(crate) fn render_request(path: &str, fields: &[String], xhr: bool) -> anyhow::Result<Request> {
    let (path, query) = match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    };

    let method = if fields.is_empty() {
        Method::Get
    } else {
        Method::Post
    };
    let mut request = Request::new(method, path).with_xhr(xhr);
    if let Some(query) = query {
        request = request.with_urlencoded(query.as_bytes());
    }
    for field in fields {
        let Some((name, value)) = field.split_once('=') else {
            anyhow::bail!("Field '{}' must be written as NAME=VALUE", field);
        };
        request = request.with_parameter(name, value);
    }
    Ok(request)
}

pub fn handle_render(
    app: &Application,
    path: &str,
    fields: &[String],
    xhr: bool,
    show_logs: bool,
) -> anyhow::Result<()> {
    let request = render_request(path, fields, xhr)?.with_locale(app.default_locale());

    let (outcome, logs) = crate::logging::capture(|| app.handle(request));

    if show_logs {
        for entry in logs.get_all() {
            eprintln!("{:>5} {} {}", entry.level, entry.target, entry.message);
        }
    }

    match outcome {
        Ok(response) => {
            println!("HTTP {}", response.status);
            if let Some(content_type) = &response.content_type {
                println!("Content-Type: {}", content_type);
            }
            if let Some(location) = &response.location {
                println!("Location: {}", location);
            }
            println!();
            println!("{}", response.body);
            Ok(())
        }
        Err(e) => anyhow::bail!("{}", e),
    }
}

pub fn handle_pages(app: &Application) {
    let mut names = app.services().pages.names();
    names.sort_unstable();
    let index = &app.services().links.settings().index_page_name;
    for name in names {
        if name.eq_ignore_ascii_case(index) {
            println!("{}  (index)", name);
        } else {
            println!("{}", name);
        }
    }
}

/// Handle `config` subcommands
pub fn handle_config(show: bool, reset: bool, path: bool) -> anyhow::Result<()> {
    if path {
        handle_config_path()
    } else if show {
        handle_config_show()
    } else if reset {
        handle_config_reset()
    } else {
        println!("Usage: trellis config [--show|--reset|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults");
        println!("  --path    Show config file path");
        Ok(())
    }
}

fn handle_config_path() -> anyhow::Result<()> {
    match Config::config_path() {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => anyhow::bail!("Could not determine config path"),
    }
}

fn handle_config_show() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    println!();
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
    Ok(())
}

fn handle_config_reset() -> anyhow::Result<()> {
    let Some(path) = Config::config_path() else {
        anyhow::bail!("Could not determine config path");
    };

    if path.exists() {
        eprint!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        );
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, Config::default().to_toml())?;

    println!("Config reset to defaults: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_request_get_with_query() {
        let request = render_request("/entry/3?t%3Aac=9", &[], false).unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.path, "/entry/3");
        assert_eq!(request.parameter("t:ac"), Some("9"));
    }

    #[test]
    fn test_render_request_post_fields() {
        let fields = vec!["name=Ada".to_string(), "t:formdata=a=b".to_string()];
        let request = render_request("index.form", &fields, true).unwrap();
        assert_eq!(request.method, Method::Post);
        assert!(request.xhr);
        assert_eq!(request.parameter("t:formdata"), Some("a=b"));

        assert!(render_request("/", &["broken".to_string()], false).is_err());
    }

    #[test]
    fn test_cli_parses_render() {
        let cli = Cli::try_parse_from(["trellis", "render", "/index", "--field", "a=1", "--xhr"]).unwrap();
        match cli.command {
            Some(Commands::Render { path, fields, xhr, logs }) => {
                assert_eq!(path, "/index");
                assert_eq!(fields, vec!["a=1".to_string()]);
                assert!(xhr);
                assert!(!logs);
            }
            _ => panic!("expected render command"),
        }
    }
}
