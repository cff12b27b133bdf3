//! `validate`: check one asset directory against its artifact requirements.
use super::{EXIT_FAILED, EXIT_OK};
use crate::cli::ValidateArgs;
use crate::outputs::validate_outputs;
use crate::util::display_path;
use anyhow::{Context, Result};

pub fn run_validate(args: &ValidateArgs) -> Result<u8> {
    let check = validate_outputs(&args.asset_type, &args.dir);
    if args.json {
        let text = serde_json::to_string_pretty(&check).context("serialize output check")?;
        println!("{text}");
    } else {
        let verdict = if check.ok { "ok" } else { "incomplete" };
        println!("{} ({}): {verdict}", args.dir.display(), args.asset_type);
        for missing in &check.missing {
            println!("  missing: {missing}");
        }
        for found in &check.found {
            println!("  found:   {}", display_path(found, Some(&args.dir)));
        }
    }
    Ok(if check.ok { EXIT_OK } else { EXIT_FAILED })
}
