//! Call command handler.
//!
//! Runs one tool through the gateway, so confirmation gating and argument
//! validation apply exactly as they do for `serve`.

use anyhow::Result;
use serde_json::Value;

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Parse `--args` into a JSON value.
pub fn parse_arguments(raw: &str) -> Result<Value, CliError> {
    let value: Value = serde_json::from_str(raw)?;
    if value.is_object() || value.is_null() {
        Ok(value)
    } else {
        Err(CliError::Arguments(
            "tool arguments must be a JSON object".to_string(),
        ))
    }
}

/// Execute the call command.
pub async fn execute(ctx: &CliContext, tool: &str, args: &str, confirm: bool) -> Result<()> {
    let arguments = parse_arguments(args)?;

    match ctx.gateway().try_execute(tool, arguments, confirm).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            if e.is_confirmation_required() {
                eprintln!("Re-run with --confirm to allow this call.");
            }
            Err(CliError::from(e).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::bootstrap;
    use crate::config::FileConfig;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_parse_arguments() {
        assert!(parse_arguments(r#"{"text":"hi"}"#).unwrap().is_object());
        assert!(parse_arguments("null").unwrap().is_null());
        assert_eq!(parse_arguments("[1]").unwrap_err().exit_code(), 2);
        assert_eq!(parse_arguments("{not json").unwrap_err().exit_code(), 2);
    }

    #[tokio::test]
    async fn test_unconfirmed_write_exits_with_tool_error() {
        let ctx = bootstrap(FileConfig::default(), None).await.unwrap();
        let err = assert_err!(
            execute(&ctx, "fs_writeFile", r#"{"path":"x","content":"y"}"#, false).await
        );
        let cli = err.downcast_ref::<CliError>().unwrap();
        assert_eq!(cli.exit_code(), 1);
        assert!(cli.to_string().contains("requires user confirmation before execution"));
    }

    #[tokio::test]
    async fn test_echo_call_succeeds() {
        let ctx = assert_ok!(bootstrap(FileConfig::default(), None).await);
        assert_ok!(execute(&ctx, "echo", r#"{"text":"hi"}"#, false).await);
    }
}
