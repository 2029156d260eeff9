use anyhow::{Context as _, Result, bail};
use awskit::config::tunables::parse_size;
use awskit::{ExecutionRequest, Tunables};
use std::process::ExitCode;
use std::time::Duration;

use crate::Context;
use crate::cli::RunArgs;
use crate::commands::Session;
use crate::interrupt;
use crate::ui;

pub fn run(ctx: &Context, args: RunArgs) -> Result<ExitCode> {
    let session = Session::load(ctx)?;
    let executor = session
        .executor()
        .with_cancel_token(interrupt::install())
        .require_credentials(args.require_credentials);

    let tunables = executor.tunables(Some(args.service.trim()));
    let request = build_request(&tunables, &args)?;
    log::info!("Running `{}`", request.display_command());

    let result = executor.execute(&request);

    if args.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
        println!("{json}");
    } else {
        ui::result(&result, ctx.quiet);
    }

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Turn command-line arguments into a request, starting from configured limits.
fn build_request(tunables: &Tunables, args: &RunArgs) -> Result<ExecutionRequest> {
    let service = args.service.trim();
    if service.is_empty() {
        bail!("--service must not be empty");
    }

    let mut request = if args.program {
        tunables.request(service, args.args.iter().cloned())
    } else {
        let mut argv = vec![awskit::types::DEFAULT_PROGRAM.to_string()];
        argv.extend(args.args.iter().cloned());
        tunables.request(service, argv)
    };

    if let Some(region) = &args.region {
        request = request.with_region(region.clone());
    }
    if let Some(timeout) = args.timeout {
        request = request.with_timeout(Duration::from_secs(timeout));
    }
    if let Some(retries) = args.retries {
        request = request.with_max_retries(retries);
    }
    if let Some(size) = &args.max_output {
        let bytes = parse_size(size).map_err(|e| anyhow::anyhow!("Invalid --max-output: {e}"))?;
        request = request.with_max_output_size(usize::try_from(bytes).unwrap_or(usize::MAX));
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> RunArgs {
        RunArgs {
            service: "ec2".to_string(),
            region: None,
            timeout: None,
            retries: None,
            max_output: None,
            json: false,
            program: false,
            require_credentials: false,
            args: extra.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_prefixes_aws() {
        let request = build_request(&Tunables::default(), &args(&["ec2", "describe-regions"])).unwrap();
        assert_eq!(request.argv, vec!["aws", "ec2", "describe-regions"]);
        assert_eq!(request.service, "ec2");
    }

    #[test]
    fn test_explicit_program() {
        let mut args = args(&["/usr/local/bin/aws", "s3", "ls"]);
        args.program = true;
        let request = build_request(&Tunables::default(), &args).unwrap();
        assert_eq!(request.argv[0], "/usr/local/bin/aws");
    }

    #[test]
    fn test_flags_override_tunables() {
        let tunables = Tunables {
            max_retries: 9,
            ..Tunables::default()
        };
        let mut args = args(&["s3", "ls"]);
        args.region = Some("eu-central-1".to_string());
        args.timeout = Some(5);
        args.retries = Some(1);
        args.max_output = Some("2KB".to_string());

        let request = build_request(&tunables, &args).unwrap();
        assert_eq!(request.region.as_deref(), Some("eu-central-1"));
        assert_eq!(request.timeout, Duration::from_secs(5));
        assert_eq!(request.max_retries, 1);
        assert_eq!(request.max_output_size, 2048);
    }

    #[test]
    fn test_tunables_apply_without_flags() {
        let tunables = Tunables {
            max_retries: 9,
            ..Tunables::default()
        };
        let request = build_request(&tunables, &args(&["s3", "ls"])).unwrap();
        assert_eq!(request.max_retries, 9);
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut bad_size = args(&["s3", "ls"]);
        bad_size.max_output = Some("lots".to_string());
        assert!(build_request(&Tunables::default(), &bad_size).is_err());

        let mut blank = args(&["s3", "ls"]);
        blank.service = "  ".to_string();
        assert!(build_request(&Tunables::default(), &blank).is_err());
    }
}
