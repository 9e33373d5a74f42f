use std::sync::LazyLock;

use pulldown_cmark::{CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd, html};
use serde::Serialize;
use syntect::highlighting::ThemeSet;
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

use crate::container::{self, ContainerDefaults, ContainerKind, ContainerToken};
use crate::slug::SlugAllocator;

// Initialize syntax highlighting resources once
pub(crate) static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
pub(crate) static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

pub(crate) const CLASS_STYLE: ClassStyle = ClassStyle::Spaced;

fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_SMART_PUNCTUATION
}

#[derive(Debug, Clone)]
pub enum Token<'a> {
    Markdown(Event<'a>),
    Container(ContainerToken),
}

/// Parsed document body: Markdown events interleaved with container
/// open/close tokens.
#[derive(Debug, Clone, Default)]
pub struct TokenStream<'a> {
    tokens: Vec<Token<'a>>,
}

impl<'a> TokenStream<'a> {
    pub fn tokens(&self) -> &[Token<'a>] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Net container nesting across the stream. Always zero for streams
    /// produced by [`parse`].
    pub fn container_balance(&self) -> i32 {
        self.tokens
            .iter()
            .filter_map(|token| match token {
                Token::Container(c) => Some(i32::from(c.nesting.delta())),
                Token::Markdown(_) => None,
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadingEntry {
    pub level: u8,
    pub title: String,
    pub slug: String,
}

/// Tokenize a shorthand-normalized body.
///
/// The body is parsed as one Markdown document, so reference definitions and
/// list structure carry across container fences.
///
/// With `exclude_hide`, every `hide` container is dropped together with its
/// content, nested containers included.
pub fn parse(body: &str, exclude_hide: bool) -> TokenStream<'static> {
    let marked = container::mark_containers(body);
    let mut tokens = Vec::new();
    let mut hidden_depth: i32 = 0;
    let mut events = Parser::new_ext(marked.text(), parser_options());

    while let Some(event) = events.next() {
        let block = match event {
            Event::Start(Tag::HtmlBlock) => {
                let mut block = vec![Event::Start(Tag::HtmlBlock)];
                for inner in events.by_ref() {
                    let end = matches!(inner, Event::End(TagEnd::HtmlBlock));
                    block.push(inner);
                    if end {
                        break;
                    }
                }
                block
            }
            other => vec![other],
        };

        let token = match block.as_slice() {
            [Event::Start(Tag::HtmlBlock), Event::Html(html), Event::End(TagEnd::HtmlBlock)] => {
                marked.token_for(html).cloned()
            }
            _ => None,
        };

        match token {
            Some(token) => {
                if exclude_hide && (hidden_depth > 0 || token.kind == ContainerKind::Hide) {
                    hidden_depth += i32::from(token.nesting.delta());
                    continue;
                }
                tokens.push(Token::Container(token));
            }
            None if hidden_depth > 0 => {}
            None => tokens.extend(block.into_iter().map(|event| Token::Markdown(event.into_static()))),
        }
    }

    TokenStream { tokens }
}

struct PendingHeading<'a> {
    level: HeadingLevel,
    classes: Vec<CowStr<'a>>,
    attrs: Vec<(CowStr<'a>, Option<CowStr<'a>>)>,
    inner: Vec<Token<'a>>,
}

/// Attach a unique `id` to every heading and collect the table of contents.
///
/// Returns a new stream; the input is consumed rather than mutated in place.
pub fn decorate_headings(stream: TokenStream<'_>) -> (TokenStream<'_>, Vec<HeadingEntry>) {
    let mut slugs = SlugAllocator::new();
    let mut toc = Vec::new();
    let mut out = Vec::with_capacity(stream.tokens.len());
    let mut pending: Option<PendingHeading<'_>> = None;

    for token in stream.tokens {
        match (pending.take(), token) {
            (None, Token::Markdown(Event::Start(Tag::Heading { level, classes, attrs, .. }))) => {
                pending = Some(PendingHeading {
                    level,
                    classes,
                    attrs,
                    inner: Vec::new(),
                });
            }
            (Some(heading), Token::Markdown(Event::End(TagEnd::Heading(end_level)))) => {
                let title = plain_text(&heading.inner).trim().to_string();
                let slug = slugs.allocate(&title);
                tracing::debug!(heading = %title, id = %slug, "Assigned heading id");
                toc.push(HeadingEntry {
                    level: heading.level as u8,
                    title,
                    slug: slug.clone(),
                });
                out.push(Token::Markdown(Event::Start(Tag::Heading {
                    level: heading.level,
                    id: Some(CowStr::from(slug)),
                    classes: heading.classes,
                    attrs: heading.attrs,
                })));
                out.extend(heading.inner);
                out.push(Token::Markdown(Event::End(TagEnd::Heading(end_level))));
            }
            (Some(mut heading), token) => {
                heading.inner.push(token);
                pending = Some(heading);
            }
            (None, token) => out.push(token),
        }
    }

    (TokenStream { tokens: out }, toc)
}

fn plain_text(tokens: &[Token<'_>]) -> String {
    let mut text = String::new();
    for token in tokens {
        match token {
            Token::Markdown(Event::Text(t) | Event::Code(t)) => text.push_str(t),
            Token::Markdown(Event::SoftBreak | Event::HardBreak) => text.push(' '),
            _ => {}
        }
    }
    text
}

/// Emit HTML for a decorated stream.
pub fn render_html(stream: &TokenStream<'_>, defaults: &ContainerDefaults) -> String {
    let events = stream.tokens.iter().map(|token| match token {
        Token::Markdown(event) => event.clone(),
        Token::Container(container) => Event::Html(container::render_token(container, defaults).into()),
    });

    let mut out = String::new();
    html::push_html(&mut out, highlight_code_blocks(events).into_iter());
    out
}

fn highlight_code_blocks<'a>(events: impl Iterator<Item = Event<'a>>) -> Vec<Event<'a>> {
    let mut processed_events = Vec::new();
    let mut events = events.into_iter();
    while let Some(event) = events.next() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(ref info))) => {
                let lang = info
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                let Some(syntax) = find_syntax(&lang) else {
                    processed_events.push(event);
                    continue;
                };

                // Collect all text events until the end of the code block
                let mut code_content = String::new();
                for inner in events.by_ref() {
                    match inner {
                        Event::End(TagEnd::CodeBlock) => break,
                        Event::Text(text) => code_content.push_str(&text),
                        _ => {}
                    }
                }

                processed_events.push(Event::Html(highlight(&code_content, &lang, syntax).into()));
            }
            other => processed_events.push(other),
        }
    }

    processed_events
}


fn find_syntax(lang: &str) -> Option<&'static SyntaxReference> {
    if lang.is_empty() {
        return None;
    }
    SYNTAX_SET.find_syntax_by_token(lang).or_else(|| {
        // Fallback mappings for languages missing from the default set
        match lang {
            "toml" => SYNTAX_SET.find_syntax_by_name("YAML"),
            "jsonc" | "json5" => SYNTAX_SET.find_syntax_by_name("JSON"),
            _ => None,
        }
    })
}

fn highlight(code: &str, lang: &str, syntax: &SyntaxReference) -> String {
    let mut generator = ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAX_SET, CLASS_STYLE);
    for line in LinesWithEndings::from(code) {
        if generator.parse_html_for_line_which_includes_newline(line).is_err() {
            return format!(
                "<pre class=\"md2html-code\"><code class=\"language-{}\">{}</code></pre>\n",
                html_escape::encode_double_quoted_attribute(lang),
                html_escape::encode_text(code)
            );
        }
    }
    format!(
        "<pre class=\"md2html-code\"><code class=\"language-{}\">{}</code></pre>\n",
        html_escape::encode_double_quoted_attribute(lang),
        generator.finalize()
    )
}
