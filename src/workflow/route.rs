//! `route`: routing decisions without running anything.
use super::EXIT_OK;
use crate::cli::RouteArgs;
use crate::routing::{route, RouteOverrides, SignalBag};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;

pub fn run_route(args: &RouteArgs) -> Result<u8> {
    let signals = parse_signals(&args.signals)?;
    let decision = route(
        &signals,
        RouteOverrides {
            asset_type: args.asset_type.forced(),
            backend: args.backend.forced(),
        },
    );
    let text = serde_json::to_string_pretty(&decision).context("serialize routing decision")?;
    println!("{text}");
    Ok(EXIT_OK)
}

fn parse_signals(raw: &str) -> Result<SignalBag> {
    let value: Value = serde_json::from_str(raw).context("parse --signals JSON")?;
    match value {
        Value::Object(map) => Ok(SignalBag(map.into_iter().collect())),
        other => Err(anyhow!(
            "--signals must be a JSON object, got {}",
            json_kind(&other)
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
