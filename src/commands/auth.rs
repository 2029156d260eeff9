use anyhow::Result;
use std::process::ExitCode;

use crate::Context;
use crate::commands::Session;
use crate::ui;

pub fn run(ctx: &Context, require: bool) -> Result<ExitCode> {
    let session = Session::load(ctx)?;
    let executor = session.executor();
    let resolver = executor.credentials(&session.profile.name);

    if require {
        return match resolver.require() {
            Ok(method) => {
                println!("{method}");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                ui::error(&e.to_string());
                eprintln!("  {}", e.advice());
                Ok(ExitCode::FAILURE)
            }
        };
    }

    let method = resolver.detect();
    if ctx.quiet {
        println!("{method}");
        return Ok(ExitCode::SUCCESS);
    }

    ui::header("Authentication");
    ui::kv("Profile", &session.profile.name);
    ui::kv("Method", &method.to_string());
    if !method.is_known() {
        ui::warn("No credentials detected; AWS CLI calls will likely fail");
    }

    Ok(ExitCode::SUCCESS)
}
