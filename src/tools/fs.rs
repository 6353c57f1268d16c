//! 文件系统工具：read / write / edit / glob / grep
//!
//! 所有路径相对项目根目录解析，绝对路径必须落在根目录内（禁止 ../ 逃逸）；
//! edit 只替换首个匹配，未命中时文件保持逐字节不变。

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// 解析路径：相对路径拼到根目录下；绝对路径须在根目录内
pub fn resolve(root: &Path, path: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(path);
    // 目标可能尚不存在（write），所以逐成分拒绝 .. 而不是依赖规范化
    if candidate
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(format!("Path '{}' is outside project root", path));
    }
    let full = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate.strip_prefix("./").unwrap_or(candidate))
    };

    let root_canon = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    // 规范化失败（目标尚不存在）时直接用拼接路径
    let canonical = full.canonicalize().unwrap_or_else(|_| full.clone());
    if canonical.starts_with(&root_canon) {
        Ok(canonical)
    } else {
        Err(format!("Path '{}' is outside project root", path))
    }
}

/// 读取文件内容；offset 为跳过的行数，limit 为返回的最大行数
pub fn read_file(
    root: &Path,
    path: &str,
    offset: Option<usize>,
    limit: Option<usize>,
) -> Result<String, String> {
    let resolved = resolve(root, path)?;
    if !resolved.is_file() {
        return Err(format!("File not found: {}", path));
    }
    let content =
        std::fs::read_to_string(&resolved).map_err(|e| format!("Read failed: {}", e))?;

    match (offset, limit) {
        (None, None) => Ok(content),
        _ => {
            let lines: Vec<&str> = content.lines().collect();
            let start = offset.unwrap_or(0).min(lines.len());
            let end = limit
                .map(|l| (start + l).min(lines.len()))
                .unwrap_or(lines.len());
            Ok(lines[start..end].join("\n"))
        }
    }
}

/// 写文件：自动创建父目录，已存在则覆盖
pub fn write_file(root: &Path, path: &str, content: &str) -> Result<String, String> {
    let resolved = resolve(root, path)?;
    if let Some(parent) = resolved.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("Create dir failed: {}", e))?;
    }
    std::fs::write(&resolved, content).map_err(|e| format!("Write failed: {}", e))?;
    Ok(format!("Wrote {}", path))
}

/// 编辑文件：替换首个 old_text 匹配；未命中时返回错误且文件不变
pub fn edit_file(root: &Path, path: &str, old_text: &str, new_text: &str) -> Result<String, String> {
    let resolved = resolve(root, path)?;
    if !resolved.is_file() {
        return Err(format!("File not found: {}", path));
    }
    let content =
        std::fs::read_to_string(&resolved).map_err(|e| format!("Read failed: {}", e))?;

    let Some(pos) = content.find(old_text) else {
        return Err("Text not found".to_string());
    };

    let new_content = format!(
        "{}{}{}",
        &content[..pos],
        new_text,
        &content[pos + old_text.len()..]
    );
    std::fs::write(&resolved, new_content).map_err(|e| format!("Write failed: {}", e))?;

    let line_number = content[..pos].lines().count() + 1;
    Ok(format!("Edited {} at line {}", path, line_number))
}

/// 查找匹配 pattern 的文件路径，按字典序返回
pub fn glob_files(root: &Path, pattern: &str, path: &str) -> Result<String, String> {
    let base = resolve(root, path)?;
    // pattern 同样禁止 ..，否则能绕过 base 列出根目录之外的文件
    if Path::new(pattern)
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(format!("Pattern '{}' is outside project root", pattern));
    }
    let full_pattern = base.join(pattern);
    let full_pattern = full_pattern.to_string_lossy();

    let mut matches: Vec<String> = glob::glob(&full_pattern)
        .map_err(|e| format!("Bad glob pattern: {}", e))?
        .filter_map(|entry| entry.ok())
        .map(|p| p.to_string_lossy().to_string())
        .collect();
    matches.sort();

    Ok(format!("{} matches\n{}", matches.len(), matches.join("\n")))
}

/// 在 path 下递归搜索 pattern（正则），文件名需匹配 file_glob；返回 path:line_no: line
pub fn grep_files(
    root: &Path,
    pattern: &str,
    path: &str,
    file_glob: &str,
    max_matches: usize,
) -> Result<String, String> {
    let base = resolve(root, path)?;
    let re = regex::Regex::new(pattern).map_err(|e| format!("Bad regex: {}", e))?;
    let name_filter =
        glob::Pattern::new(file_glob).map_err(|e| format!("Bad file glob: {}", e))?;

    let mut matches = Vec::new();
    'walk: for entry in WalkDir::new(&base).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if !name_filter.matches(&file_name) {
            continue;
        }
        // 二进制或不可读文件直接跳过
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        for (line_no, line) in content.lines().enumerate() {
            if re.is_match(line) {
                matches.push(format!(
                    "{}:{}: {}",
                    entry.path().display(),
                    line_no + 1,
                    line.trim_end()
                ));
                if matches.len() >= max_matches {
                    break 'walk;
                }
            }
        }
    }

    Ok(format!("{} matches\n{}", matches.len(), matches.join("\n")))
}
