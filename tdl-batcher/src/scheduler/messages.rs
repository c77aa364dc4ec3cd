//! Status texts shown to requesters.
//!
//! Formatted texts use Telegram MarkdownV2; every user-supplied fragment goes
//! through [`escape_markdown`].

use std::path::Path;

/// Text plus whether it carries markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusText {
    pub text: String,
    pub formatted: bool,
}

impl StatusText {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            formatted: false,
        }
    }

    fn formatted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            formatted: true,
        }
    }
}

const MARKDOWN_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
    '\\',
];

/// Escape MarkdownV2 special characters.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn queued(queue_len: usize) -> StatusText {
    StatusText::plain(format!("⏳ Queued for download... ({queue_len} in queue)"))
}

pub fn merged() -> StatusText {
    StatusText::plain("🔄 Merged into a batch download...")
}

pub fn processing(files: usize, remaining_groups: usize) -> StatusText {
    let mut text = if files == 1 {
        "⏳ Downloading... (1 file)".to_string()
    } else {
        format!("⏳ Batch downloading... ({files} files)")
    };
    if remaining_groups > 0 {
        text.push_str(&format!("\n📋 Remaining groups: {remaining_groups}"));
    }
    StatusText::plain(text)
}

pub fn completed(sources: &[String], destination: &Path, remaining_groups: usize) -> StatusText {
    let folder = escape_markdown(&destination.to_string_lossy());

    let mut text = match sources {
        [single] => format!(
            "✅ *Download complete\\!*\n\n📁 *Folder*: `{folder}`\n\n🔗 *Source*: {}",
            escape_markdown(single)
        ),
        _ => {
            let list = sources
                .iter()
                .map(|s| format!("• {}", escape_markdown(s)))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "✅ *Batch download complete\\!*\n\n📁 *Folder*: `{folder}`\n\n🔗 *Sources* \\({} files\\):\n{list}",
                sources.len()
            )
        }
    };

    if remaining_groups > 0 {
        text.push_str(&format!(
            "\n\n📋 *Remaining groups*: {remaining_groups} pending"
        ));
    } else {
        text.push_str("\n\n🎉 *Status*: all downloads finished");
    }

    StatusText::formatted(text)
}

pub fn merged_completed(source: &str) -> StatusText {
    StatusText::formatted(format!(
        "✅ Merged download complete\n🔗 Source: {}",
        escape_markdown(source)
    ))
}

pub fn failed(detail: &str) -> StatusText {
    StatusText::plain(format!("❌ Batch download failed: {detail}"))
}

pub fn failed_generic() -> StatusText {
    StatusText::plain("❌ Batch download failed")
}

pub fn all_batches_complete() -> StatusText {
    StatusText::formatted("🎉 *All batches complete\\!*\n\n✅ Every download task has finished")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_markdown() {
        assert_eq!(
            escape_markdown("https://t.me/chan_x/12"),
            "https://t\\.me/chan\\_x/12"
        );
        assert_eq!(escape_markdown("a(b)!"), "a\\(b\\)\\!");
        assert_eq!(escape_markdown("plain"), "plain");
    }

    #[test]
    fn test_processing_counts() {
        let single = processing(1, 0);
        assert_eq!(single.text, "⏳ Downloading... (1 file)");
        assert!(!single.formatted);

        let many = processing(3, 2);
        assert!(many.text.contains("(3 files)"));
        assert!(many.text.contains("Remaining groups: 2"));
    }

    #[test]
    fn test_completed_single_and_batch() {
        let dest = Path::new("./data/chan_1");

        let one = completed(&["https://t.me/chan/1".to_string()], dest, 0);
        assert!(one.formatted);
        assert!(one.text.starts_with("✅ *Download complete"));
        assert!(one.text.contains("https://t\\.me/chan/1"));
        assert!(one.text.contains("all downloads finished"));

        let sources = vec![
            "https://t.me/chan/1".to_string(),
            "https://t.me/chan/2".to_string(),
        ];
        let many = completed(&sources, dest, 1);
        assert!(many.text.contains("\\(2 files\\)"));
        assert!(many.text.contains("• https://t\\.me/chan/2"));
        assert!(many.text.contains("*Remaining groups*: 1 pending"));
    }

    #[test]
    fn test_failure_texts_are_plain() {
        let primary = failed("tdl exited with code 1");
        assert!(!primary.formatted);
        assert!(primary.text.ends_with("tdl exited with code 1"));
        assert_eq!(failed_generic().text, "❌ Batch download failed");
    }
}
