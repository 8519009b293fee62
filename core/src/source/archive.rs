use std::io::{Cursor, Read};
use zip::ZipArchive;

use super::filter::{looks_binary, should_skip_path, MAX_FILE_SIZE};
use crate::error::SourceError;

/// 解压归档，按过滤规则拼接所有文本文件
///
/// 每个文件前写入 `--- File: <path> ---` 标记行
pub fn flatten_archive(bytes: &[u8]) -> Result<String, SourceError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| SourceError::Fetch(format!("failed to open repository archive: {}", e)))?;

    let mut output = String::new();
    let mut included = 0usize;

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable archive entry {}: {}", index, e);
                continue;
            }
        };

        if entry.is_dir() {
            continue;
        }

        let path = entry.name().to_string();
        if should_skip_path(&path) {
            tracing::debug!("Skipping {} (filtered path)", path);
            continue;
        }

        if entry.size() > MAX_FILE_SIZE {
            tracing::debug!("Skipping {} ({} bytes, too large)", path, entry.size());
            continue;
        }

        let mut content = Vec::with_capacity(entry.size() as usize);
        // 头部声明的大小不可信，读取时再限制一次
        if let Err(e) = entry
            .by_ref()
            .take(MAX_FILE_SIZE + 1)
            .read_to_end(&mut content)
        {
            tracing::warn!("Skipping {}: {}", path, e);
            continue;
        }
        if content.len() as u64 > MAX_FILE_SIZE {
            tracing::debug!("Skipping {} (too large after decompression)", path);
            continue;
        }

        if looks_binary(&content) {
            tracing::debug!("Skipping {} (binary content)", path);
            continue;
        }

        output.push_str(&format!("\n--- File: {} ---\n", path));
        output.push_str(&String::from_utf8_lossy(&content));
        output.push('\n');
        included += 1;
    }

    if included == 0 {
        return Err(SourceError::NoSuitableContent);
    }

    tracing::info!("Flattened {} files from repository archive", included);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer.add_directory("demo-abc123/", options).unwrap();
        for (name, body) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn concatenates_source_files_with_markers() {
        let bytes = build_zip(&[
            ("demo-abc123/src/main.go", b"package main\n"),
            ("demo-abc123/app.py", b"print('hi')"),
        ]);

        let text = flatten_archive(&bytes).unwrap();
        assert_eq!(
            text,
            "\n--- File: demo-abc123/src/main.go ---\npackage main\n\n\
             \n--- File: demo-abc123/app.py ---\nprint('hi')\n"
        );
    }

    #[test]
    fn applies_filter_policy() {
        let big = vec![b'x'; (MAX_FILE_SIZE + 1) as usize];
        let bytes = build_zip(&[
            ("demo-abc123/node_modules/x/index.js", b"module.exports = 1"),
            ("demo-abc123/yarn.lock", b"lock"),
            ("demo-abc123/public/app.min.js", b"min"),
            ("demo-abc123/logo.png", b"png"),
            ("demo-abc123/huge.js", big.as_slice()),
            ("demo-abc123/blob.c", b"int\x00main"),
            ("demo-abc123/keep.rs", b"fn main() {}"),
        ]);

        let text = flatten_archive(&bytes).unwrap();
        assert!(text.contains("--- File: demo-abc123/keep.rs ---"));
        assert_eq!(text.matches("--- File:").count(), 1);
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let bytes = build_zip(&[("demo-abc123/notes.md", b"caf\xe9")]);
        let text = flatten_archive(&bytes).unwrap();
        assert!(text.contains("caf\u{FFFD}"));
    }

    #[test]
    fn no_qualifying_files() {
        let bytes = build_zip(&[("demo-abc123/image.jpg", b"jpg")]);
        assert!(matches!(
            flatten_archive(&bytes),
            Err(SourceError::NoSuitableContent)
        ));
    }

    #[test]
    fn corrupt_archive_is_a_fetch_error() {
        assert!(matches!(
            flatten_archive(b"definitely not a zip"),
            Err(SourceError::Fetch(_))
        ));
    }
}
