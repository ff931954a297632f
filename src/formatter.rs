//! Human-readable renderings of an [`ExtractionResult`].

use crate::schema::ExtractionResult;

/// Markdown report: header, counters, separator, then the extracted text verbatim.
pub fn to_markdown(result: &ExtractionResult) -> String {
    let mut md_lines = Vec::with_capacity(6);
    md_lines.push(format!("# OCR Result: {}\n", result.source_name));

    if let Some(pages) = result.page_count {
        md_lines.push(format!("**Total Pages:** {}\n", pages));
    }

    md_lines.push(format!("**Total Lines:** {}\n", result.line_count));
    md_lines.push("---\n".to_string());
    md_lines.push("## Extracted Text\n".to_string());
    md_lines.push(result.full_text.clone());

    md_lines.join("\n")
}

pub fn to_plain_text(result: &ExtractionResult) -> String {
    result.full_text.clone()
}
