//! Config command - configuration inspection and setup.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::{self, SatchelConfig};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the merged configuration, defaults filled in
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./satchel.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local } => cmd_init(local, ctx),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("# No config files loaded (using defaults)");
    } else {
        for source in &sources {
            println!("# Loaded from {}", source.display());
        }
    }
    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }
    println!();

    print!("{}", loaded.config.resolved().to_toml()?);
    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;

    println!("Config file search order (later overrides earlier):\n");

    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'satchel config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

fn cmd_init(local: bool, ctx: &Context) -> Result<()> {
    let path = if local {
        std::path::PathBuf::from("satchel.toml")
    } else {
        user_config_path(ctx)
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    let contents = format!(
        "# Satchel configuration\n\n{}",
        SatchelConfig::new().resolved().to_toml()?
    );
    config::write_config_file(&path, &contents)?;

    println!("Created {}", path.display());
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    if let Some(path) = user_config_path(ctx) {
        println!("{}", path.display());
    } else {
        eprintln!("Could not determine config directory");
    }
    Ok(())
}

fn user_config_path(ctx: &Context) -> Option<std::path::PathBuf> {
    match &ctx.config_dir {
        Some(dir) => Some(dir.join("config.toml")),
        None => config::xdg_config_path(),
    }
}
