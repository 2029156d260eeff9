use anyhow::Result;
use awskit::ExecutionRequest;

use crate::Context;
use crate::commands::Session;
use crate::ui;

pub fn run(ctx: &Context, region: Option<String>) -> Result<()> {
    let session = Session::load(ctx)?;
    let executor = session.executor();

    let mut request = ExecutionRequest::aws("sts", ["sts", "get-caller-identity"]);
    if let Some(region) = region {
        request = request.with_region(region);
    }

    let (region, source) = executor.resolve_region(&request);
    if ctx.quiet {
        println!("{region}");
    } else {
        ui::kv("Region", &region);
        ui::kv("Source", &source.to_string());
    }
    Ok(())
}
