pub mod builder;
pub mod config;
pub mod container;
pub mod frontmatter;
pub mod ignore;
pub mod markdown;
pub mod navigation;
pub mod paths;
pub mod renderer;
pub mod scanner;
pub mod site;
pub mod slug;
pub mod template;

// Re-export main types
pub use builder::{
    BuildError, BuildSession, RebuildOutcome, RenderResult, SiteBuilder, convert_docs_directory,
};
pub use config::{AppConfig, DEFAULT_CONFIG_FILE, NavigationConfig};
pub use container::ContainerKind;
pub use frontmatter::{FrontMatter, FrontMatterError, split_front_matter};
pub use ignore::{IgnoreFilter, IgnoreRule};
pub use markdown::HeadingEntry;
pub use navigation::{NavigationBuilder, NavigationNode, SortKey, SortOrder};
pub use paths::OutputPathRegistry;
pub use renderer::{MarkdownRenderer, Metadata, RenderError, RenderedDocument};
pub use scanner::{SiteScanner, SourceDocument};
pub use site::{format_segment_title, is_markdown_file};
pub use slug::slugify;
pub use template::{Theme, ThemeError, ThemeManager, ThemeNotFoundError};
