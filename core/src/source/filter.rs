use std::path::Path;

/// 单个文件大小上限 (100 KiB)
pub const MAX_FILE_SIZE: u64 = 100 * 1024;

/// 二进制检测时检查的前缀长度
const BINARY_SNIFF_LEN: usize = 1024;

// 依赖、构建产物、版本控制等目录
const SKIPPED_DIRS: &[&str] = &[
    "node_modules/",
    ".git/",
    "vendor/",
    ".idea/",
    ".vscode/",
    "dist/",
    "build/",
    "coverage/",
    "tmp/",
    "__pycache__/",
    "target/",
];

const SKIPPED_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "go.sum",
    "cargo.lock",
];

const SKIPPED_SUFFIXES: &[&str] = &[".map", ".min.js", ".min.css"];

const ALLOWED_EXTENSIONS: &[&str] = &[
    "go", "js", "jsx", "ts", "tsx", "py", "java", "c", "cpp", "h", "hpp", "rb", "php", "cs",
    "rs", "swift", "kt", "html", "css", "json", "yaml", "yml", "sql", "md",
];

/// 路径层面的过滤：目录、锁文件/压缩产物、扩展名白名单
pub fn should_skip_path(path: &str) -> bool {
    let normalized = path.replace('\\', "/");

    // 归档内路径通常带有 "<repo>-<sha>/" 前缀，按片段匹配
    let with_root = format!("/{}", normalized);
    if SKIPPED_DIRS
        .iter()
        .any(|dir| with_root.contains(&format!("/{}", dir)))
    {
        return true;
    }

    let file_name = Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    if SKIPPED_FILES.contains(&file_name.as_str())
        || SKIPPED_SUFFIXES
            .iter()
            .any(|suffix| file_name.ends_with(suffix))
    {
        return true;
    }

    !is_supported_file(Path::new(&normalized))
}

pub fn is_supported_file(path: &Path) -> bool {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// 前 1 KiB 内出现 NUL 字节即视为二进制
pub fn looks_binary(content: &[u8]) -> bool {
    let sniff = &content[..content.len().min(BINARY_SNIFF_LEN)];
    sniff.contains(&0)
}
