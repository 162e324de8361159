//! Directory listings.

use std::path::Path;

use crate::util::html_escape;

/// One listed directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// Read the entries of `dir`, directories first, each group by name.
pub async fn entries(dir: &Path) -> std::io::Result<Vec<Entry>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();

    while let Some(item) = reader.next_entry().await? {
        let Ok(meta) = item.metadata().await else {
            continue;
        };
        entries.push(Entry {
            name: item.file_name().to_string_lossy().into_owned(),
            is_dir: meta.is_dir(),
            size: meta.len(),
        });
    }

    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

/// Render a listing of `entries` for the request path `path`.
///
/// `parent` adds a `../` row; it is false at the mount root.
pub fn render(path: &str, entries: &[Entry], parent: bool) -> String {
    let title = html_escape(path);
    let mut rows = String::new();

    if parent {
        rows.push_str("<tr><td><a href=\"../\">../</a></td><td>-</td></tr>\n");
    }
    for entry in entries {
        let suffix = if entry.is_dir { "/" } else { "" };
        let href = html_escape(&format!("{}{suffix}", urlencoding::encode(&entry.name)));
        let label = html_escape(&format!("{}{suffix}", entry.name));
        let size = if entry.is_dir {
            "-".to_string()
        } else {
            entry.size.to_string()
        };
        rows.push_str(&format!(
            "<tr><td><a href=\"{href}\">{label}</a></td><td>{size}</td></tr>\n"
        ));
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Index of {title}</title>\n</head>\n<body>\n<h1>Index of {title}</h1>\n\
         <table>\n<tr><th>Name</th><th>Size</th></tr>\n{rows}</table>\n</body>\n</html>\n"
    )
}
