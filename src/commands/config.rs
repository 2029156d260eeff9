use anyhow::Result;
use awskit::Tunables;

use crate::Context;
use crate::cli::ConfigCommand;
use crate::commands::{Session, profile_source_label};
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { service } => show(ctx, service.as_deref()),
        ConfigCommand::Paths => show_paths(ctx),
    }
}

fn show(ctx: &Context, service: Option<&str>) -> Result<()> {
    let session = Session::load(ctx)?;
    let merged = session
        .profile
        .merged(session.environment.as_deref(), service);

    ui::header("Configuration");
    ui::kv(
        "Profile",
        &format!(
            "{} ({})",
            session.profile.name,
            profile_source_label(session.profile.source)
        ),
    );
    ui::kv(
        "Environment",
        session.environment.as_deref().unwrap_or("(none)"),
    );
    if let Some(service) = service {
        ui::kv("Service", service);
    }

    println!();
    if merged.is_empty() {
        ui::dim("No configuration values set");
    } else {
        let width = merged.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in merged.iter() {
            let origin = merged.origin(key).unwrap_or("?");
            println!("  {key:<width$} = {value}");
            ui::dim(&format!("  {:<width$}   from {origin}", ""));
        }
    }

    let tunables = Tunables::from_config(&merged);
    ui::header("Limits");
    ui::kv("Max retries", &tunables.max_retries.to_string());
    ui::kv(
        "Retry base delay",
        &format!("{:.1}s", tunables.retry.base_delay.as_secs_f64()),
    );
    ui::kv("Timeout", &format!("{}s", tunables.timeout.as_secs()));
    ui::kv(
        "Max output",
        &ui::format_size(tunables.max_output_size as u64),
    );
    if let Some(service) = service {
        // Buckets are process-wide, so rates ignore service-scoped layers.
        let rates = Tunables::from_config(
            &session.profile.merged(session.environment.as_deref(), None),
        )
        .rate_limits;
        ui::kv("Rate limit", &format!("{}/s", rates.rate_for(service)));
    }

    Ok(())
}

fn show_paths(ctx: &Context) -> Result<()> {
    let session = Session::load(ctx)?;
    let sources = &session.sources;

    ui::header("Configuration Files");
    ui::kv("Config directory", &paths::config_dir()?.display().to_string());
    ui::kv("State directory", &paths::state_dir()?.display().to_string());
    println!();

    let entry = |label: &str, path: &std::path::Path| {
        let marker = if path.exists() { "" } else { " (not found)" };
        ui::info(label);
        ui::dim(&format!("  {}{marker}", path.display()));
    };
    entry("default", &sources.default_file);
    entry("override", &sources.override_file);
    if let Some(dir) = &sources.profiles_dir {
        entry("profile", &dir.join(&session.profile.name));
    }

    Ok(())
}
