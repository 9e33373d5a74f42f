//! `::: keyword [label]` container blocks.
//!
//! Three kinds are recognised: `hide` renders a collapsible `<details>`
//! section, `note` and `warning` render admonitions. A bare `::: <label>`
//! line is shorthand for `::: hide <label>` and is rewritten before the
//! document is tokenized.
//!
//! ```text
//! ::: hide 更多
//!
//! hidden body
//! :::
//! ```
//!
//! Containers nest, and may sit inside list items. A closing fence closes
//! the innermost open container at the same list depth. Containers still
//! open when their list item ends, or at the end of the document, are closed
//! there. A closing fence with nothing to close is ordinary text.
//!
//! Fence lines are swapped for placeholder HTML comments so the whole body
//! goes through the Markdown parser in one pass; see [`mark_containers`].

use std::borrow::Cow;
use std::collections::HashMap;

use serde::Serialize;

const MARKER: char = ':';
const MIN_MARKER_LEN: usize = 3;

pub const DEFAULT_HIDE_TITLE: &str = "点击展开";
pub const DEFAULT_COLLAPSE_TITLE: &str = "收起";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Hide,
    Note,
    Warning,
}

impl ContainerKind {
    pub const ALL: [ContainerKind; 3] = [ContainerKind::Hide, ContainerKind::Note, ContainerKind::Warning];

    pub fn keyword(self) -> &'static str {
        match self {
            ContainerKind::Hide => "hide",
            ContainerKind::Note => "note",
            ContainerKind::Warning => "warning",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.keyword().eq_ignore_ascii_case(word))
    }

    /// Whether an opener's parameter string belongs to this kind. Only the
    /// first whitespace-delimited token is compared, case-insensitively.
    pub fn accepts(self, params: &str) -> bool {
        params
            .split_whitespace()
            .next()
            .is_some_and(|head| head.eq_ignore_ascii_case(self.keyword()))
    }

    /// The label that follows the keyword, trimmed. Empty when absent.
    pub fn label(self, params: &str) -> &str {
        let info = params.trim();
        match info.split_once(char::is_whitespace) {
            Some((head, rest)) if head.eq_ignore_ascii_case(self.keyword()) => rest.trim(),
            None if info.eq_ignore_ascii_case(self.keyword()) => "",
            _ => info,
        }
    }

    fn default_admonition_title(self) -> String {
        let keyword = self.keyword();
        let mut chars = keyword.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Direction of a container token: `+1` opens, `-1` closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nesting {
    Open,
    Close,
}

impl Nesting {
    pub fn delta(self) -> i8 {
        match self {
            Nesting::Open => 1,
            Nesting::Close => -1,
        }
    }
}

/// An open or close event for one container, carrying the opener's raw
/// info string (keyword plus optional label).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerToken {
    pub kind: ContainerKind,
    pub nesting: Nesting,
    pub info: String,
}

impl ContainerToken {
    pub fn label(&self) -> &str {
        self.kind.label(&self.info)
    }
}

/// Theme-provided captions used when a container has no label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDefaults {
    pub hide_title: String,
    pub collapse_title: String,
    /// Admonition kind name -> default title.
    pub admonition_titles: HashMap<String, String>,
}

impl Default for ContainerDefaults {
    fn default() -> Self {
        Self {
            hide_title: DEFAULT_HIDE_TITLE.to_string(),
            collapse_title: DEFAULT_COLLAPSE_TITLE.to_string(),
            admonition_titles: HashMap::new(),
        }
    }
}

impl ContainerDefaults {
    fn admonition_title(&self, kind: ContainerKind) -> String {
        self.admonition_titles
            .get(kind.keyword())
            .cloned()
            .unwrap_or_else(|| kind.default_admonition_title())
    }
}

/// Emit the HTML for one container token.
pub fn render_token(token: &ContainerToken, defaults: &ContainerDefaults) -> String {
    match (token.kind, token.nesting) {
        (ContainerKind::Hide, Nesting::Open) => {
            let label = token.label();
            let summary = if label.is_empty() { defaults.hide_title.as_str() } else { label };
            format!(
                "<details class=\"md2html-hide\">\n  <summary>{}</summary>\n  <div class=\"md2html-hide__body\">\n",
                html_escape::encode_quoted_attribute(summary)
            )
        }
        (ContainerKind::Hide, Nesting::Close) => format!(
            concat!(
                "    <div class=\"md2html-hide__footer\">\n",
                "      <button type=\"button\" class=\"md2html-hide__collapse\" data-md2html-hide-collapse>{}</button>\n",
                "    </div>\n",
                "  </div>\n</details>\n"
            ),
            html_escape::encode_quoted_attribute(&defaults.collapse_title)
        ),
        (kind, Nesting::Open) => {
            let label = token.label();
            let title = if label.is_empty() {
                defaults.admonition_title(kind)
            } else {
                label.to_string()
            };
            format!(
                "<div class=\"md2html-admonition md2html-admonition--{}\">\n  <div class=\"md2html-admonition__title\">{}</div>\n  <div class=\"md2html-admonition__body\">\n",
                kind.keyword(),
                html_escape::encode_quoted_attribute(&title)
            )
        }
        (_, Nesting::Close) => "  </div>\n</div>\n".to_string(),
    }
}

/// Rewrite bare `::: <label>` openers to `::: hide <label>`.
///
/// Only fences of exactly three colons followed by whitespace are
/// considered, and only when their first word is not a known keyword.
/// Lines inside fenced code blocks are left alone.
pub fn normalize_shorthand(markdown: &str) -> Cow<'_, str> {
    let mut out: Option<String> = None;
    let mut context = BlockContext::default();
    let mut offset = 0;

    for line in markdown.split_inclusive('\n') {
        let rewritten = match context.scan(line) {
            LineKind::Fence { indent, .. } => {
                rewrite_shorthand(&line[indent..]).map(|rest| format!("{}{rest}", &line[..indent]))
            }
            _ => None,
        };
        match (rewritten, out.as_mut()) {
            (Some(new_line), Some(buf)) => buf.push_str(&new_line),
            (Some(new_line), None) => {
                let mut buf = String::with_capacity(markdown.len() + 8);
                buf.push_str(&markdown[..offset]);
                buf.push_str(&new_line);
                out = Some(buf);
            }
            (None, Some(buf)) => buf.push_str(line),
            (None, None) => {}
        }
        offset += line.len();
    }

    match out {
        Some(buf) => Cow::Owned(buf),
        None => Cow::Borrowed(markdown),
    }
}

fn rewrite_shorthand(line: &str) -> Option<String> {
    let (content, ending) = split_line_ending(line);
    let rest = content.strip_prefix(":::")?;
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    let label = rest.trim();
    let head = label.split_whitespace().next()?;
    if ContainerKind::from_keyword(head).is_some() {
        return None;
    }
    Some(format!("::: {} {label}{ending}", ContainerKind::Hide.keyword()))
}

const PLACEHOLDER_OPEN: &str = "<!--md2html-container:";
const PLACEHOLDER_CLOSE: &str = "-->";

pub(crate) fn placeholder(index: usize) -> String {
    format!("{PLACEHOLDER_OPEN}{index}{PLACEHOLDER_CLOSE}")
}

/// A body whose container fences have been replaced by placeholder HTML
/// comments, one per token. The Markdown parser sees each placeholder as an
/// HTML block at the fence's position, inside whatever list item holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkedBody<'a> {
    text: Cow<'a, str>,
    tokens: Vec<ContainerToken>,
}

impl MarkedBody<'_> {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[ContainerToken] {
        &self.tokens
    }

    /// The token an HTML block stands for, if it is one of our placeholders.
    pub fn token_for(&self, html: &str) -> Option<&ContainerToken> {
        let index = html
            .trim()
            .strip_prefix(PLACEHOLDER_OPEN)?
            .strip_suffix(PLACEHOLDER_CLOSE)?
            .parse::<usize>()
            .ok()?;
        self.tokens.get(index)
    }
}

struct OpenContainer {
    kind: ContainerKind,
    info: String,
    marker_len: usize,
    /// Content column of the list item the container was opened in.
    base: usize,
}

impl OpenContainer {
    fn close(self) -> ContainerToken {
        ContainerToken {
            kind: self.kind,
            nesting: Nesting::Close,
            info: self.info,
        }
    }
}

/// Replace container fences in a (shorthand-normalized) body with
/// placeholders. Open and close tokens are always balanced.
pub fn mark_containers(body: &str) -> MarkedBody<'_> {
    let mut out = String::with_capacity(body.len());
    let mut tokens = Vec::new();
    let mut stack: Vec<OpenContainer> = Vec::new();
    let mut context = BlockContext::default();

    for line in body.split_inclusive('\n') {
        let (base, fence) = match context.scan(line) {
            LineKind::Blank | LineKind::Code => {
                out.push_str(line);
                continue;
            }
            LineKind::Text { base } => (base, None),
            LineKind::Fence { base, indent, fence } => (base, Some((indent, fence))),
        };

        // The list item holding these containers has ended.
        while stack.last().is_some_and(|open| open.base > base) {
            if let Some(open) = stack.pop() {
                let indent = " ".repeat(open.base);
                push_placeholder(&mut out, &mut tokens, &indent, open.close(), "\n");
            }
        }

        let token = fence.and_then(|(indent, fence)| {
            fence_token(&mut stack, base, &fence).map(|token| (indent, token))
        });
        match token {
            Some((indent, token)) => {
                let (_, ending) = split_line_ending(line);
                push_placeholder(&mut out, &mut tokens, &line[..indent], token, ending);
            }
            None => out.push_str(line),
        }
    }

    if !stack.is_empty() && !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    while let Some(open) = stack.pop() {
        let indent = " ".repeat(open.base);
        push_placeholder(&mut out, &mut tokens, &indent, open.close(), "\n");
    }

    let text = if tokens.is_empty() { Cow::Borrowed(body) } else { Cow::Owned(out) };
    MarkedBody { text, tokens }
}

fn fence_token(stack: &mut Vec<OpenContainer>, base: usize, fence: &ContainerFence<'_>) -> Option<ContainerToken> {
    if fence.params.is_empty() {
        let closes = stack
            .last()
            .is_some_and(|open| open.base == base && fence.marker_len >= open.marker_len);
        return if closes { stack.pop().map(OpenContainer::close) } else { None };
    }

    let kind = ContainerKind::ALL
        .into_iter()
        .find(|kind| kind.accepts(fence.params))?;
    stack.push(OpenContainer {
        kind,
        info: fence.params.to_string(),
        marker_len: fence.marker_len,
        base,
    });
    Some(ContainerToken {
        kind,
        nesting: Nesting::Open,
        info: fence.params.to_string(),
    })
}

fn push_placeholder(out: &mut String, tokens: &mut Vec<ContainerToken>, indent: &str, token: ContainerToken, ending: &str) {
    out.push_str(indent);
    out.push_str(&placeholder(tokens.len()));
    out.push_str(ending);
    tokens.push(token);
}

struct ContainerFence<'a> {
    marker_len: usize,
    params: &'a str,
}

fn parse_container_fence(rest: &str) -> Option<ContainerFence<'_>> {
    let marker_len = rest.chars().take_while(|&c| c == MARKER).count();
    if marker_len < MIN_MARKER_LEN {
        return None;
    }
    Some(ContainerFence {
        marker_len,
        params: rest[marker_len..].trim(),
    })
}

fn split_line_ending(line: &str) -> (&str, &str) {
    let content = line.trim_end_matches(['\n', '\r']);
    (content, &line[content.len()..])
}

enum LineKind<'l> {
    Blank,
    /// Part of a fenced code block, fences included.
    Code,
    Text {
        base: usize,
    },
    Fence {
        base: usize,
        indent: usize,
        fence: ContainerFence<'l>,
    },
}

#[derive(Clone, Copy)]
struct CodeFence {
    marker: char,
    len: usize,
    base: usize,
}

/// Line-level view of the block structure the container layer cares about:
/// fenced code blocks and the content columns of open list items.
#[derive(Default)]
struct BlockContext {
    code: Option<CodeFence>,
    lists: Vec<usize>,
}

impl BlockContext {
    fn scan<'l>(&mut self, line: &'l str) -> LineKind<'l> {
        let (content, _) = split_line_ending(line);
        if content.trim().is_empty() {
            return LineKind::Blank;
        }
        let indent = content.len() - content.trim_start_matches(' ').len();
        let rest = &content[indent..];

        if let Some(open) = self.code {
            let closes = indent <= open.base + 3
                && code_fence(rest).is_some_and(|(marker, len, info)| {
                    marker == open.marker && len >= open.len && info.is_empty()
                });
            if closes {
                self.code = None;
            }
            return LineKind::Code;
        }

        while self.lists.last().is_some_and(|&column| indent < column) {
            self.lists.pop();
        }
        let base = self.lists.last().copied().unwrap_or(0);
        if indent - base > 3 {
            // Indented code.
            return LineKind::Text { base };
        }

        if let Some((marker, len, _)) = code_fence(rest) {
            self.code = Some(CodeFence { marker, len, base });
            return LineKind::Code;
        }
        if let Some(fence) = parse_container_fence(rest) {
            return LineKind::Fence { base, indent, fence };
        }
        if let Some(width) = list_marker_width(rest) {
            self.lists.push(indent + width);
        }
        LineKind::Text { base }
    }
}

fn code_fence(rest: &str) -> Option<(char, usize, &str)> {
    let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = rest.chars().take_while(|&c| c == marker).count();
    (len >= 3).then(|| (marker, len, rest[len..].trim()))
}

/// Width of a list item marker plus the spaces after it, i.e. the offset of
/// the item's content from the marker's column.
fn list_marker_width(rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let marker = match bytes.first()? {
        b'-' | b'*' | b'+' => 1,
        b'0'..=b'9' => {
            let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
            match bytes.get(digits)? {
                b'.' | b')' if digits <= 9 => digits + 1,
                _ => return None,
            }
        }
        _ => return None,
    };
    let spaces = bytes[marker..].iter().take_while(|&&b| b == b' ').count();
    match spaces {
        0 if marker == bytes.len() => Some(marker + 1),
        0 => None,
        1..=4 => Some(marker + spaces),
        _ => Some(marker + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn open(kind: ContainerKind, info: &str) -> ContainerToken {
        ContainerToken {
            kind,
            nesting: Nesting::Open,
            info: info.to_string(),
        }
    }

    fn close(kind: ContainerKind, info: &str) -> ContainerToken {
        ContainerToken {
            kind,
            nesting: Nesting::Close,
            info: info.to_string(),
        }
    }

    #[test]
    fn test_accepts_only_own_keyword() {
        assert!(ContainerKind::Hide.accepts("hide 更多"));
        assert!(ContainerKind::Hide.accepts("HIDE"));
        assert!(!ContainerKind::Hide.accepts("note hide"));
        assert!(ContainerKind::Warning.accepts("  warning  Careful "));
        assert!(!ContainerKind::Note.accepts("notes"));
        assert!(!ContainerKind::Note.accepts(""));
    }

    #[test]
    fn test_label_extraction() {
        assert_eq!(ContainerKind::Hide.label("hide 更多 内容"), "更多 内容");
        assert_eq!(ContainerKind::Note.label("note"), "");
        assert_eq!(ContainerKind::Note.label("Note\tTip  "), "Tip");
    }

    #[test]
    fn test_normalize_rewrites_bare_label() {
        let out = normalize_shorthand("::: 自定义标题\n\nX\n:::\n");
        assert_eq!(out, "::: hide 自定义标题\n\nX\n:::\n");
    }

    #[test]
    fn test_normalize_leaves_known_keywords() {
        let text = "::: note Tip\nX\n:::\n::: Warning\nY\n:::\n";
        assert!(matches!(normalize_shorthand(text), Cow::Borrowed(_)));
    }

    #[test]
    fn test_normalize_skips_code_fences() {
        let text = "```md\n::: example\n```\n::: real one\n:::\n";
        let out = normalize_shorthand(text);
        assert_eq!(out, "```md\n::: example\n```\n::: hide real one\n:::\n");
    }

    #[test]
    fn test_normalize_requires_whitespace_after_marker() {
        let text = ":::label\n::::  wide\n";
        assert_eq!(normalize_shorthand(text), text);
    }

    #[test]
    fn test_normalize_keeps_list_indentation() {
        let out = normalize_shorthand("- item\n\n  ::: 答案\n  42\n  :::\n");
        assert_eq!(out, "- item\n\n  ::: hide 答案\n  42\n  :::\n");
    }

    #[test]
    fn test_mark_simple_container() {
        let marked = mark_containers("intro\n\n::: hide 更多\n\nbody\n:::\noutro\n");
        assert_eq!(
            marked.text(),
            format!("intro\n\n{}\n\nbody\n{}\noutro\n", placeholder(0), placeholder(1))
        );
        assert_eq!(
            marked.tokens(),
            &[open(ContainerKind::Hide, "hide 更多"), close(ContainerKind::Hide, "hide 更多")]
        );
        assert_eq!(marked.token_for(&format!("{}\n", placeholder(1))), Some(&marked.tokens()[1]));
        assert_eq!(marked.token_for("<!-- unrelated -->"), None);
    }

    #[test]
    fn test_mark_nested_containers() {
        let marked = mark_containers("::: hide outer\n::: note inner\ntext\n:::\nafter\n:::\n");
        assert_eq!(
            marked.tokens(),
            &[
                open(ContainerKind::Hide, "hide outer"),
                open(ContainerKind::Note, "note inner"),
                close(ContainerKind::Note, "note inner"),
                close(ContainerKind::Hide, "hide outer"),
            ]
        );
    }

    #[test]
    fn test_mark_closes_unterminated_at_end() {
        let marked = mark_containers("::: warning\nstill open");
        assert_eq!(
            marked.text(),
            format!("{}\nstill open\n{}\n", placeholder(0), placeholder(1))
        );
        assert_eq!(
            marked.tokens(),
            &[open(ContainerKind::Warning, "warning"), close(ContainerKind::Warning, "warning")]
        );
    }

    #[test]
    fn test_mark_stray_close_and_unknown_kind_are_text() {
        let text = ":::\n:::info x\n";
        let marked = mark_containers(text);
        assert_eq!(marked.text(), text);
        assert!(marked.tokens().is_empty());
    }

    #[test]
    fn test_mark_short_closer_does_not_close_long_opener() {
        let marked = mark_containers(":::: note\n:::\n::::\n");
        assert_eq!(
            marked.text(),
            format!("{}\n:::\n{}\n", placeholder(0), placeholder(1))
        );
    }

    #[test]
    fn test_mark_ignores_fences_in_code() {
        let text = "```\n::: note\n```\n\n    ::: note\n";
        assert!(mark_containers(text).tokens().is_empty());
    }

    #[test]
    fn test_mark_container_inside_list_item() {
        let marked = mark_containers("- item one\n\n  ::: note\n  inside\n  :::\n\n- item two\n");
        assert_eq!(
            marked.text(),
            format!(
                "- item one\n\n  {}\n  inside\n  {}\n\n- item two\n",
                placeholder(0),
                placeholder(1)
            )
        );
    }

    #[test]
    fn test_mark_closes_container_when_list_item_ends() {
        let marked = mark_containers("- item\n\n  ::: note\n  inside\n\nafter\n");
        assert_eq!(
            marked.text(),
            format!("- item\n\n  {}\n  inside\n\n  {}\nafter\n", placeholder(0), placeholder(1))
        );
    }

    #[test]
    fn test_closing_fence_in_list_does_not_close_outer_container() {
        let marked = mark_containers("::: note\n- item\n\n  :::\n:::\n");
        assert_eq!(marked.tokens().len(), 2);
        assert!(marked.text().contains("  :::\n"));
    }

    #[test]
    fn test_list_marker_width() {
        assert_eq!(list_marker_width("- a"), Some(2));
        assert_eq!(list_marker_width("10. a"), Some(4));
        assert_eq!(list_marker_width("*   a"), Some(4));
        assert_eq!(list_marker_width("---"), None);
        assert_eq!(list_marker_width("1.5"), None);
    }

    #[test]
    fn test_render_hide_uses_defaults_and_escapes() {
        let defaults = ContainerDefaults::default();
        let open = open(ContainerKind::Hide, "hide");
        assert!(render_token(&open, &defaults).contains("<summary>点击展开</summary>"));

        let labelled = ContainerToken {
            info: "hide <b>&</b>".to_string(),
            ..open.clone()
        };
        assert!(render_token(&labelled, &defaults).contains("<summary>&lt;b&gt;&amp;&lt;/b&gt;</summary>"));

        let close = ContainerToken {
            nesting: Nesting::Close,
            ..open
        };
        let html = render_token(&close, &defaults);
        assert!(html.contains("data-md2html-hide-collapse>收起</button>"));
        assert!(html.ends_with("</details>\n"));
    }

    #[test]
    fn test_render_admonition_titles() {
        let mut defaults = ContainerDefaults::default();
        let note = open(ContainerKind::Note, "note");
        let html = render_token(&note, &defaults);
        assert!(html.contains("md2html-admonition md2html-admonition--note"));
        assert!(html.contains("<div class=\"md2html-admonition__title\">Note</div>"));

        defaults
            .admonition_titles
            .insert("note".to_string(), "提示".to_string());
        assert!(render_token(&note, &defaults).contains(">提示</div>"));

        let labelled = ContainerToken {
            info: "note 自定义".to_string(),
            ..note
        };
        assert!(render_token(&labelled, &defaults).contains(">自定义</div>"));
    }
}
