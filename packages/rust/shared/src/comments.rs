//! Comment-style table: how to write a comment for a given file extension.
//!
//! Used by the directive resolver and the reducer to mark where inlined
//! content came from, and by the writer to wrap license headers.

/// Comment delimiters for one family of file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentStyle {
    /// Opening delimiter (first line of a block).
    pub header: &'static str,
    /// Prefix for every line inside a block.
    pub body: &'static str,
    /// Closing delimiter (last line of a block).
    pub footer: &'static str,
}

const C_STYLE: CommentStyle = CommentStyle {
    header: "/*",
    body: " *",
    footer: " */",
};

const MARKUP_STYLE: CommentStyle = CommentStyle {
    header: "<!--",
    body: "   ",
    footer: "-->",
};

const COFFEE_STYLE: CommentStyle = CommentStyle {
    header: "###",
    body: "",
    footer: "###",
};

/// Look up the comment style for an extension (without the leading dot).
pub fn comment_style(extension: &str) -> Option<CommentStyle> {
    match extension.to_ascii_lowercase().as_str() {
        "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" | "css" | "less" | "scss" | "sass"
        | "styl" => Some(C_STYLE),
        "html" | "htm" | "xml" | "svg" | "vue" => Some(MARKUP_STYLE),
        "coffee" => Some(COFFEE_STYLE),
        _ => None,
    }
}

/// Whether output of this extension is a statement-terminated script.
pub fn is_script(extension: &str) -> bool {
    matches!(
        extension.to_ascii_lowercase().as_str(),
        "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx"
    )
}

/// Whether this extension is a stylesheet.
pub fn is_stylesheet(extension: &str) -> bool {
    matches!(
        extension.to_ascii_lowercase().as_str(),
        "css" | "less" | "scss" | "sass" | "styl"
    )
}

impl CommentStyle {
    /// Render `text` as a single-line comment.
    pub fn line(&self, text: &str) -> String {
        let footer = self.footer.trim();
        if footer.is_empty() {
            format!("{} {text}", self.header)
        } else {
            format!("{} {text} {footer}", self.header)
        }
    }

    /// Render `text` (possibly multi-line) as a block comment.
    pub fn block(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 16);
        out.push_str(self.header);
        out.push('\n');
        for line in text.trim_end().lines() {
            if line.trim().is_empty() {
                out.push_str(self.body.trim_end());
            } else {
                out.push_str(self.body);
                out.push(' ');
                out.push_str(line);
            }
            out.push('\n');
        }
        out.push_str(self.footer);
        out
    }
}

/// Single-line comment for `extension`, or `None` when the extension has
/// no known comment syntax.
pub fn line_comment(extension: &str, text: &str) -> Option<String> {
    comment_style(extension).map(|style| style.line(text))
}

/// Block comment for `extension`, or `None` when the extension has no
/// known comment syntax.
pub fn block_comment(extension: &str, text: &str) -> Option<String> {
    comment_style(extension).map(|style| style.block(text))
}
