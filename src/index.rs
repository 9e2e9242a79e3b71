//! Directory-index HTML generator: a pluggable default implementation for
//! listing a directory's contents when no welcome file is present.

use std::io;
use std::path::Path;

/// `(directory, displayed path) → HTML`. The default implementation lists
/// entries as a sorted `<ul>`; embedders may supply their own.
pub trait DirectoryIndex: Send + Sync {
    fn render(&self, dir: &Path, display_path: &str) -> io::Result<String>;
}

/// Plain-HTML directory listing: sorted entries, directories suffixed with
/// `/`, a parent-directory link when not already at the context root.
#[derive(Default)]
pub struct HtmlDirectoryIndex;

impl DirectoryIndex for HtmlDirectoryIndex {
    fn render(&self, dir: &Path, display_path: &str) -> io::Result<String> {
        let mut entries: Vec<(String, bool)> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .map(|e| {
                let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
                (e.file_name().to_string_lossy().into_owned(), is_dir)
            })
            .collect();
        entries.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));

        let mut html = String::new();
        html.push_str("<html><head><title>Index of ");
        html.push_str(&escape(display_path));
        html.push_str("</title></head><body><h1>Index of ");
        html.push_str(&escape(display_path));
        html.push_str("</h1><ul>");

        if display_path != "/" {
            html.push_str("<li><a href=\"../\">../</a></li>");
        }

        for (name, is_dir) in entries {
            let suffix = if is_dir { "/" } else { "" };
            html.push_str(&format!(
                "<li><a href=\"{name}{suffix}\">{name}{suffix}</a></li>",
                name = escape(&name),
                suffix = suffix,
            ));
        }

        html.push_str("</ul></body></html>");
        Ok(html)
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
