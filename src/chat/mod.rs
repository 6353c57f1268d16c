//! 交互式对话：系统提示词、历史与工具循环

pub mod context;
pub mod loop_;

pub use context::History;
pub use loop_::{ChatOutcome, ChatSession, LoopEnd};

/// 内置系统提示词：声明工具协议与可用工具
const SYSTEM_PREAMBLE: &str = r#"You are a coding assistant with tool access.

To use a tool, emit a fenced block tagged `tool` containing one JSON object:

```tool
{"tool": "read", "path": "src/main.rs", "offset": 0, "limit": 50}
```

Available tools:
- read: {"tool": "read", "path": "...", "offset": N, "limit": N} — read a file (offset/limit optional)
- write: {"tool": "write", "path": "...", "content": "..."} — create or overwrite a file
- edit: {"tool": "edit", "path": "...", "old_text": "...", "new_text": "..."} — replace the first occurrence
- glob: {"tool": "glob", "pattern": "*.rs", "path": "src"} — list matching files
- grep: {"tool": "grep", "pattern": "fn ", "path": "src", "file_glob": "*.rs"} — search file contents
- bash: {"tool": "bash", "command": "cargo check", "timeout": 60} — run a shell command
- work_status: {"tool": "work_status"} — show the work catalog by tier
- dev_progress: {"tool": "dev_progress"} — show execution statistics

Emit each call in its own block. When no tool is needed, answer directly.
"#;

/// 加载系统提示词：优先 config/prompts/system.txt，缺失时用内置版本
pub fn load_system_prompt() -> String {
    for path in ["config/prompts/system.txt", "../config/prompts/system.txt"] {
        if let Ok(text) = std::fs::read_to_string(path) {
            if !text.trim().is_empty() {
                return text;
            }
        }
    }
    SYSTEM_PREAMBLE.to_string()
}
