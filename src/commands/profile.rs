use anyhow::Result;
use awskit::ProfileSource;

use crate::Context;
use crate::cli::ProfileCommand;
use crate::commands::profile_source_label;
use crate::settings::Settings;
use crate::ui;

pub fn run(ctx: &Context, cmd: ProfileCommand) -> Result<()> {
    match cmd {
        ProfileCommand::Show => show(ctx),
        ProfileCommand::Use { name } => use_profile(&name),
        ProfileCommand::Clear => clear(),
    }
}

fn show(ctx: &Context) -> Result<()> {
    let settings = Settings::load()?;
    let (name, source) =
        ProfileSource::select(ctx.profile.as_deref(), settings.profile.as_deref());

    if ctx.quiet {
        println!("{name}");
    } else {
        ui::kv("Profile", &name);
        ui::kv("Selected by", profile_source_label(source));
    }
    Ok(())
}

fn use_profile(name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Profile name must not be empty");
    }

    let mut settings = Settings::load()?;
    settings.profile = Some(name.to_string());
    settings.save()?;

    ui::success(&format!("Using profile '{name}'"));
    Ok(())
}

fn clear() -> Result<()> {
    let mut settings = Settings::load()?;
    if settings.profile.take().is_none() {
        ui::info("No saved profile");
        return Ok(());
    }
    settings.save()?;

    ui::success("Cleared saved profile");
    Ok(())
}
