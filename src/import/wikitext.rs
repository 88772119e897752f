//! WikiText to plaintext cleaner
//!
//! Converts MediaWiki markup to clean plaintext. Nested constructs (templates,
//! tables, links) are handled with small bracket-matching scanners; flat
//! rewrites use regexes compiled once.

use super::source::TransformError;
use super::transform::TextTransform;
use crate::config::CleaningConfig;
use regex::Regex;
use std::sync::OnceLock;

static RE_NOWIKI: OnceLock<Regex> = OnceLock::new();
static RE_PRE: OnceLock<Regex> = OnceLock::new();
static RE_COMMENT: OnceLock<Regex> = OnceLock::new();
static RE_REF_SELF_CLOSING: OnceLock<Regex> = OnceLock::new();
static RE_REF_PAIRED: OnceLock<Regex> = OnceLock::new();
static RE_IPA: OnceLock<Regex> = OnceLock::new();
static RE_CONVERT: OnceLock<Regex> = OnceLock::new();
static RE_EXTERNAL_LINK: OnceLock<Regex> = OnceLock::new();
static RE_EXTERNAL_BARE: OnceLock<Regex> = OnceLock::new();
static RE_HEADING: OnceLock<Regex> = OnceLock::new();
static RE_LIST: OnceLock<Regex> = OnceLock::new();
static RE_MAGIC_WORDS: OnceLock<Regex> = OnceLock::new();
static RE_BR: OnceLock<Regex> = OnceLock::new();
static RE_INLINE_TAGS: OnceLock<Regex> = OnceLock::new();
static RE_EMPTY_PARENS: OnceLock<Regex> = OnceLock::new();

/// Kinds of `[[...]]` link, by prefix
#[derive(Debug, PartialEq, Eq)]
enum LinkKind {
    Article,
    Category,
    File,
    Wiktionary,
    /// Project pages and interlanguage links
    Dropped,
}

fn classify_link(target: &str) -> LinkKind {
    let Some((prefix, _)) = target.split_once(':') else {
        return LinkKind::Article;
    };
    let prefix = prefix.trim().to_lowercase();

    match prefix.as_str() {
        "category" | "kategorie" | "catégorie" | "categoría" => LinkKind::Category,
        "file" | "image" | "datei" | "fichier" | "archivo" => LinkKind::File,
        "wikt" | "wiktionary" => LinkKind::Wiktionary,
        "wikipedia" | "wp" | "help" | "portal" | "template" | "user" => LinkKind::Dropped,
        // Interlanguage links: 2-3 letter language code, optionally with a variant
        p if is_language_code(p) => LinkKind::Dropped,
        _ => LinkKind::Article,
    }
}

fn is_language_code(prefix: &str) -> bool {
    let base = prefix.split('-').next().unwrap_or(prefix);
    (2..=3).contains(&base.len()) && base.chars().all(|c| c.is_ascii_lowercase())
}

/// WikiText cleaner that converts MediaWiki markup to plain text
#[derive(Debug, Clone)]
pub struct WikiTextCleaner {
    remove_refs: bool,
    remove_tables: bool,
    remove_categories: bool,
    remove_files: bool,
}

impl Default for WikiTextCleaner {
    fn default() -> Self {
        Self {
            remove_refs: true,
            remove_tables: true,
            remove_categories: true,
            remove_files: true,
        }
    }
}

impl WikiTextCleaner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CleaningConfig) -> Self {
        Self {
            remove_refs: config.remove_refs,
            remove_tables: config.remove_tables,
            remove_categories: config.remove_categories,
            remove_files: config.remove_files,
        }
    }

    /// Clean WikiText and return plaintext
    pub fn clean(&self, wikitext: &str) -> String {
        let mut text = self.handle_nowiki(wikitext);

        text = replace(&RE_COMMENT, r"(?s)<!--.*?-->", &text, "");

        if self.remove_refs {
            text = self.remove_references(&text);
        }

        // Templates whose content is worth keeping, before the generic removal
        text = replace(
            &RE_IPA,
            r"(?i)\{\{IPA(?:-[^|{}]+)*\|([^|{}]+)(?:\|[^{}]*)?\}\}",
            &text,
            " -LSB- ${1} -RSB- ",
        );
        text = replace(
            &RE_CONVERT,
            r"(?i)\{\{convert\|([^|{}]*)\|([^|{}]*)(?:\|[^{}]*)?\}\}",
            &text,
            "${1} ${2}",
        );

        if self.remove_tables {
            text = strip_nested(&text, ('{', '|'), ('|', '}'));
        }
        text = strip_nested(&text, ('{', '{'), ('}', '}'));

        text = self.process_internal_links(&text);
        text = self.process_external_links(&text);
        text = self.process_formatting(&text);
        text = self.process_html(&text);

        // Leftovers from link and table syntax, then parentheses emptied by removals
        text = text.replace('|', "");
        text = replace(&RE_EMPTY_PARENS, r"\([^a-zA-Z0-9]*\)", &text, " ");

        clean_whitespace(&text)
    }

    /// Strip <nowiki> and <pre> tags, keeping their content
    fn handle_nowiki(&self, text: &str) -> String {
        let result = replace(&RE_NOWIKI, r"(?is)<nowiki\s*/>|<nowiki>(.*?)</nowiki>", text, "${1}");
        replace(&RE_PRE, r"(?is)<pre>(.*?)</pre>", &result, "${1}")
    }

    /// Remove <ref .../> and <ref>...</ref>
    fn remove_references(&self, text: &str) -> String {
        let result = replace(&RE_REF_SELF_CLOSING, r"(?is)<ref[^>]*/>", text, "");
        replace(
            &RE_REF_PAIRED,
            r"(?is)<ref(?:\s[^>]*)?>.*?</ref\s*>",
            &result,
            "",
        )
    }

    /// Process internal links [[link]] or [[link|display]]
    ///
    /// Open links are kept on an explicit stack, innermost last. A link is
    /// rendered into its parent once its `]]` is reached, so nested links in
    /// a display or caption are already plain text at that point.
    fn process_internal_links(&self, text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut open: Vec<String> = Vec::new();
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '[' && chars.peek() == Some(&'[') {
                chars.next();
                open.push(String::new());
            } else if c == ']' && chars.peek() == Some(&']') && !open.is_empty() {
                chars.next();
                if let Some(content) = open.pop() {
                    let rendered = self.render_link(&content);
                    open.last_mut().unwrap_or(&mut result).push_str(&rendered);
                }
            } else {
                open.last_mut().unwrap_or(&mut result).push(c);
            }
        }

        // Unterminated links run to the end of the text
        while let Some(content) = open.pop() {
            let rendered = self.render_link(&content);
            open.last_mut().unwrap_or(&mut result).push_str(&rendered);
        }

        result
    }

    /// Plain text for the inside of one `[[...]]`
    fn render_link(&self, content: &str) -> String {
        let (target, display) = match content.split_once('|') {
            Some((target, display)) => (target, Some(display)),
            None => (content, None),
        };

        match classify_link(target) {
            LinkKind::Article => display
                .filter(|d| !d.trim().is_empty())
                .unwrap_or(target)
                .to_string(),
            LinkKind::Category if !self.remove_categories => target
                .split_once(':')
                .map(|(_, name)| name.trim().to_string())
                .unwrap_or_default(),
            // The caption is the last pipe-separated field
            LinkKind::File if !self.remove_files && display.is_some() => {
                content.rsplit('|').next().unwrap_or_default().to_string()
            }
            LinkKind::Wiktionary => target
                .split_once(':')
                .map(|(_, word)| word.to_string())
                .unwrap_or_default(),
            LinkKind::Category | LinkKind::File | LinkKind::Dropped => String::new(),
        }
    }

    /// Process external links [url text] -> text, [url] -> url
    fn process_external_links(&self, text: &str) -> String {
        let result = replace(
            &RE_EXTERNAL_LINK,
            r"\[https?://[^\s\]]+\s+([^\]]+)\]",
            text,
            "${1}",
        );
        replace(&RE_EXTERNAL_BARE, r"\[(https?://[^\s\]]+)\]", &result, "${1}")
    }

    /// Bold/italic quotes, headings, rules, lists and magic words
    fn process_formatting(&self, text: &str) -> String {
        let mut result = text.replace("'''''", "");
        result = result.replace("'''", "");
        result = result.replace("''", "");

        result = replace(&RE_HEADING, r"(?m)^=+\s*(.*?)\s*=+[ \t]*$", &result, "${1}\n");
        result = result.replace("----", "");
        result = replace(&RE_LIST, r"(?m)^[*#:;]+[ \t]*", &result, "");
        replace(&RE_MAGIC_WORDS, r"__[A-Z]+__", &result, "")
    }

    /// Entities, line breaks and presentational tags
    fn process_html(&self, text: &str) -> String {
        let result = text.replace("&nbsp;", " ");
        let result = replace(&RE_BR, r"(?i)<br\s*/?>", &result, "\n");
        replace(
            &RE_INLINE_TAGS,
            r"(?i)</?(?:small|big|sup|sub|span|div|center|blockquote|u|s|abbr|code|poem)\b[^>]*>",
            &result,
            "",
        )
    }
}

impl TextTransform for WikiTextCleaner {
    fn apply(&self, body: &str) -> Result<String, TransformError> {
        Ok(self.clean(body))
    }
}

fn replace(cell: &'static OnceLock<Regex>, pattern: &str, text: &str, replacement: &str) -> String {
    let re = cell.get_or_init(|| Regex::new(pattern).expect("invalid built-in pattern"));
    re.replace_all(text, replacement).into_owned()
}

/// Remove `open ... close` spans, tracking nesting depth
fn strip_nested(text: &str, open: (char, char), close: (char, char)) -> String {
    let mut result = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == open.0 && chars.peek() == Some(&open.1) {
            depth += 1;
            chars.next();
        } else if depth > 0 && c == close.0 && chars.peek() == Some(&close.1) {
            depth -= 1;
            chars.next();
        } else if depth == 0 {
            result.push(c);
        }
    }

    result
}

/// Collapse runs of spaces and blank lines
fn clean_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_newline = false;
    let mut prev_space = false;

    for c in text.chars() {
        if c == '\n' {
            if result.ends_with(' ') {
                result.pop();
            }
            if !prev_newline {
                result.push('\n');
                prev_newline = true;
            }
            prev_space = false;
        } else if c.is_whitespace() {
            if !prev_space && !prev_newline {
                result.push(' ');
                prev_space = true;
            }
        } else {
            result.push(c);
            prev_newline = false;
            prev_space = false;
        }
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_bold_italic() {
        let cleaner = WikiTextCleaner::new();
        let result = cleaner.clean("This is '''bold''' and ''italic'' text.");
        assert_eq!(result, "This is bold and italic text.");
    }

    #[test]
    fn test_internal_links() {
        let cleaner = WikiTextCleaner::new();

        let result = cleaner.clean("The [[United States]] is a country.");
        assert_eq!(result, "The United States is a country.");

        let result = cleaner.clean("The [[United States|US]] is a country.");
        assert_eq!(result, "The US is a country.");
    }

    #[test]
    fn test_remove_templates() {
        let cleaner = WikiTextCleaner::new();
        assert_eq!(cleaner.clean("Hello {{template}} world."), "Hello world.");
        assert_eq!(cleaner.clean("A {{outer|{{inner}}}} B"), "A B");
    }

    #[test]
    fn test_categories_removed_or_kept() {
        let cleaner = WikiTextCleaner::new();
        let result = cleaner.clean("Content [[Category:Test]] more content.");
        assert_eq!(result, "Content more content.");

        let keep = WikiTextCleaner::from_config(&CleaningConfig {
            remove_categories: false,
            ..CleaningConfig::default()
        });
        assert_eq!(keep.clean("Content [[Category:Test]]"), "Content Test");
    }

    #[test]
    fn test_file_links_with_nested_caption() {
        let cleaner = WikiTextCleaner::new();
        let text = "Before [[File:Map.png|thumb|A [[river]] map]] after.";
        assert_eq!(cleaner.clean(text), "Before after.");

        let keep = WikiTextCleaner::from_config(&CleaningConfig {
            remove_files: false,
            ..CleaningConfig::default()
        });
        assert_eq!(keep.clean(text), "Before A river map after.");
    }

    #[test]
    fn test_whitespace_cleanup() {
        let cleaner = WikiTextCleaner::new();
        let result = cleaner.clean("Hello   world\n\n\n\ntest");
        assert_eq!(result, "Hello world\ntest");
    }

    #[test]
    fn test_remove_tables() {
        let cleaner = WikiTextCleaner::new();
        let result = cleaner.clean("Before {| class=\"wikitable\"\n|-\n| cell\n|} After");
        assert_eq!(result, "Before After");
    }

    #[test]
    fn test_references_and_comments() {
        let cleaner = WikiTextCleaner::new();
        let text = "Fact<ref name=\"a\">Source, p. 4</ref> and more<ref name=\"a\" />.<!-- hidden\nnote -->";
        assert_eq!(cleaner.clean(text), "Fact and more.");
    }

    #[test]
    fn test_ipa_convert_and_wiktionary() {
        let cleaner = WikiTextCleaner::new();
        assert_eq!(
            cleaner.clean("Paris {{IPA-fr|pa.ʁi|lang}} is"),
            "Paris -LSB- pa.ʁi -RSB- is"
        );
        assert_eq!(cleaner.clean("It is {{convert|5|km|mi}} long"), "It is 5 km long");
        assert_eq!(cleaner.clean("A [[wikt:gizmo|gizmos]] here"), "A gizmo here");
    }

    #[test]
    fn test_html_leftovers() {
        let cleaner = WikiTextCleaner::new();
        assert_eq!(cleaner.clean("one<br />two&nbsp;three"), "one\ntwo three");
        assert_eq!(cleaner.clean("x <small>tiny</small> y"), "x tiny y");
        assert_eq!(cleaner.clean("Name ({{lang|de|x}}) is"), "Name is");
    }

    #[test]
    fn test_headings_and_lists() {
        let cleaner = WikiTextCleaner::new();
        let result = cleaner.clean("Intro\n== History ==\n* first\n# second\n__NOTOC__");
        assert_eq!(result, "Intro\nHistory\nfirst\nsecond");
    }

    #[test]
    fn test_external_links() {
        let cleaner = WikiTextCleaner::new();
        assert_eq!(cleaner.clean("See [https://example.org the site]."), "See the site.");
        assert_eq!(cleaner.clean("See [https://example.org]."), "See https://example.org.");
    }

    #[test]
    fn test_malformed_markup_does_not_panic() {
        let cleaner = WikiTextCleaner::new();
        for text in ["[[", "]] {{", "{| |} |}", "<ref", "[[a|", "''''", "[[Category:", "{{IPA|"] {
            let _ = cleaner.clean(text);
        }
    }

    #[test]
    fn test_deeply_nested_links_do_not_overflow_the_stack() {
        // Small thread stack so unbounded recursion would abort the test binary
        let handle = std::thread::Builder::new()
            .stack_size(1024 * 1024)
            .spawn(|| {
                let cleaner = WikiTextCleaner::new();
                let unclosed = cleaner.clean(&"[[".repeat(200_000));
                let nested = cleaner.clean(&format!(
                    "x {}y{} z",
                    "[[a|".repeat(100_000),
                    "]]".repeat(100_000)
                ));
                (unclosed, nested)
            })
            .unwrap();

        let (unclosed, nested) = handle.join().unwrap();
        assert_eq!(unclosed, "");
        assert_eq!(nested, "x y z");
    }

    #[test]
    fn test_unterminated_link_keeps_its_text() {
        let cleaner = WikiTextCleaner::new();
        assert_eq!(cleaner.clean("See [[Paris"), "See Paris");
        assert_eq!(cleaner.clean("A [[b|c [[d]] e"), "A c d e");
    }

    #[test]
    fn test_complex_wikitext() {
        let cleaner = WikiTextCleaner::new();
        let wikitext = r#"
'''Albert Einstein''' (14 March 1879 – 18 April 1955) was a German-born [[theoretical physicist]].

He developed the [[theory of relativity]]<ref>{{cite book|title=Einstein}}</ref>, one of the two pillars of [[modern physics]].

{{Infobox scientist
| name = Albert Einstein
| birth_date = 14 March 1879
}}

[[Category:Physicists]]
[[de:Albert Einstein]]
"#;

        let result = cleaner.clean(wikitext);

        assert!(result.starts_with("Albert Einstein (14 March 1879 – 18 April 1955)"));
        assert!(result.contains("theoretical physicist"));
        assert!(result.contains("theory of relativity, one of"));

        assert!(!result.contains("'''"));
        assert!(!result.contains("[["));
        assert!(!result.contains("{{"));
        assert!(!result.contains("<ref>"));
        assert!(!result.contains("Category:"));
        assert!(!result.contains("de:"));
        assert!(!result.contains("Infobox"));
    }

    #[test]
    fn test_classify_link() {
        assert_eq!(classify_link("Paris"), LinkKind::Article);
        assert_eq!(classify_link("Category:X"), LinkKind::Category);
        assert_eq!(classify_link("image:x.png"), LinkKind::File);
        assert_eq!(classify_link("fr:Paris"), LinkKind::Dropped);
        assert_eq!(classify_link("zh-yue:Paris"), LinkKind::Dropped);
        assert_eq!(classify_link("Star Wars: Episode IV"), LinkKind::Article);
    }
}
