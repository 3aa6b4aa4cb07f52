//! Built-in tools that run inside the gateway process.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use toolgate_core::{GatewayError, InputSchema, LocalToolHandler, LocalToolRegistry, ToolInfo};

/// Registry with every built-in tool.
pub fn registry() -> Result<LocalToolRegistry, GatewayError> {
    LocalToolRegistry::new()
        .with(Arc::new(Echo))?
        .with(Arc::new(TimeNow))?
        .with(Arc::new(ReadFile))?
        .with(Arc::new(ListDir))?
        .with(Arc::new(WriteFile))?
        .with(Arc::new(ShellExec))
}

fn schema(raw: Value) -> InputSchema {
    InputSchema::parse(raw).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid built-in schema, accepting any arguments");
        InputSchema::permissive()
    })
}

fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .with_context(|| format!("missing string argument '{key}'"))
}

/// Returns its arguments unchanged.
pub struct Echo;

#[async_trait]
impl LocalToolHandler for Echo {
    fn info(&self) -> ToolInfo {
        ToolInfo::local("echo")
            .with_description("Return the given arguments unchanged")
            .with_input_schema(schema(json!({
                "type": "object",
                "properties": { "text": { "type": "string" } }
            })))
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        Ok(arguments)
    }
}

/// Current time.
pub struct TimeNow;

#[async_trait]
impl LocalToolHandler for TimeNow {
    fn info(&self) -> ToolInfo {
        ToolInfo::local("time.now")
            .with_description("Current date and time in UTC and local time")
            .with_input_schema(InputSchema::permissive())
    }

    async fn call(&self, _arguments: Value) -> Result<Value> {
        let now = chrono::Utc::now();
        Ok(json!({
            "utc": now.to_rfc3339(),
            "local": now.with_timezone(&chrono::Local).to_rfc3339(),
            "unix": now.timestamp(),
        }))
    }
}

/// Read a UTF-8 text file.
pub struct ReadFile;

#[async_trait]
impl LocalToolHandler for ReadFile {
    fn info(&self) -> ToolInfo {
        ToolInfo::local("fs.readFile")
            .with_description("Read a UTF-8 text file")
            .with_input_schema(schema(json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            })))
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let path = required_str(&arguments, "path")?;
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {path}"))?;
        Ok(json!({ "path": path, "content": content }))
    }
}

/// List a directory.
pub struct ListDir;

#[async_trait]
impl LocalToolHandler for ListDir {
    fn info(&self) -> ToolInfo {
        ToolInfo::local("fs.listDir")
            .with_description("List the entries of a directory")
            .with_input_schema(schema(json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            })))
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let path = required_str(&arguments, "path")?;
        let mut reader = tokio::fs::read_dir(path)
            .await
            .with_context(|| format!("failed to list {path}"))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let file_type = entry.file_type().await?;
            let kind = if file_type.is_dir() {
                "dir"
            } else if file_type.is_symlink() {
                "symlink"
            } else {
                "file"
            };
            entries.push((entry.file_name().to_string_lossy().into_owned(), kind));
        }
        entries.sort();

        let entries: Vec<Value> = entries
            .into_iter()
            .map(|(name, kind)| json!({ "name": name, "kind": kind }))
            .collect();
        Ok(json!({ "path": path, "entries": entries }))
    }
}

/// Write a text file, creating parent directories.
pub struct WriteFile;

#[async_trait]
impl LocalToolHandler for WriteFile {
    fn info(&self) -> ToolInfo {
        ToolInfo::local("fs.writeFile")
            .with_description("Write text to a file, replacing its contents")
            .with_input_schema(schema(json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "content": { "type": "string" }
                },
                "required": ["path", "content"]
            })))
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let path = required_str(&arguments, "path")?;
        let content = required_str(&arguments, "content")?;

        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("failed to write {path}"))?;

        Ok(json!({ "path": path, "bytes": content.len() }))
    }
}

/// Run a command through the system shell.
pub struct ShellExec;

#[async_trait]
impl LocalToolHandler for ShellExec {
    fn info(&self) -> ToolInfo {
        ToolInfo::local("shell.exec")
            .with_description("Run a shell command and capture its output")
            .with_input_schema(schema(json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string" },
                    "cwd": { "type": "string" }
                },
                "required": ["command"]
            })))
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let command = required_str(&arguments, "command")?;
        if command.trim().is_empty() {
            bail!("command is empty");
        }

        #[cfg(windows)]
        let mut process = {
            let mut process = tokio::process::Command::new("cmd");
            process.arg("/C").arg(command);
            process
        };
        #[cfg(not(windows))]
        let mut process = {
            let mut process = tokio::process::Command::new("sh");
            process.arg("-c").arg(command);
            process
        };

        if let Some(cwd) = arguments.get("cwd").and_then(Value::as_str) {
            process.current_dir(cwd);
        }
        process.kill_on_drop(true);

        let output = process
            .output()
            .await
            .with_context(|| format!("failed to run '{command}'"))?;

        Ok(json!({
            "exitCode": output.status.code(),
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_all_builtins() {
        let registry = registry().unwrap();
        let names: Vec<String> = registry.names().into_iter().collect();
        assert_eq!(
            names,
            vec![
                "echo",
                "fs.listDir",
                "fs.readFile",
                "fs.writeFile",
                "shell.exec",
                "time.now"
            ]
        );
        assert!(registry.tools().all(ToolInfo::is_local));
    }

    #[test]
    fn test_builtin_schemas_are_strict() {
        let info = WriteFile.info();
        let mut properties = info.input_schema.property_names();
        properties.sort_unstable();
        assert_eq!(properties, vec!["content", "path"]);
        assert!(info.input_schema.validate_arguments(&json!({ "path": "x" })).is_err());
    }

    #[tokio::test]
    async fn test_echo_returns_arguments() {
        let output = Echo.call(json!({ "text": "hi" })).await.unwrap();
        assert_eq!(output, json!({ "text": "hi" }));
    }

    #[tokio::test]
    async fn test_time_now_reports_unix_seconds() {
        let output = TimeNow.call(json!({})).await.unwrap();
        assert!(output["unix"].as_i64().unwrap() > 1_600_000_000);
        assert!(output["utc"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_write_read_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested").join("notes.txt");
        let file_str = file.to_str().unwrap();

        let written = WriteFile
            .call(json!({ "path": file_str, "content": "hello" }))
            .await
            .unwrap();
        assert_eq!(written["bytes"], 5);

        let read = ReadFile.call(json!({ "path": file_str })).await.unwrap();
        assert_eq!(read["content"], "hello");

        let listed = ListDir
            .call(json!({ "path": dir.path().to_str().unwrap() }))
            .await
            .unwrap();
        assert_eq!(listed["entries"], json!([{ "name": "nested", "kind": "dir" }]));
    }

    #[tokio::test]
    async fn test_read_missing_file_fails() {
        let err = ReadFile
            .call(json!({ "path": "/nonexistent/file.txt" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_exec_captures_output() {
        let output = ShellExec
            .call(json!({ "command": "echo hello && echo oops >&2" }))
            .await
            .unwrap();
        assert_eq!(output["exitCode"], 0);
        assert_eq!(output["stdout"], "hello\n");
        assert_eq!(output["stderr"], "oops\n");
    }
}
