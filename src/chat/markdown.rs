//! Markdown rendering for model replies.
//!
//! Replies are parsed with `pulldown-cmark` and laid out as terminal text.
//! With GFM enabled, tables, strikethrough and task lists are recognized.
//! With color enabled, emphasis becomes ANSI styling; without it, emphasis
//! markers are dropped and the text is left plain.

use pulldown_cmark::{Event, Options, Parser, Tag};
use unicode_width::UnicodeWidthStr;

use crate::chat::render::{
    ANSI_BOLD, ANSI_CYAN, ANSI_DIM, ANSI_ITALIC, ANSI_RESET, ANSI_STRIKE, ANSI_YELLOW,
};

/// How Markdown is rendered.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MarkdownOptions {
    /// Recognize GitHub-flavored extensions.
    pub gfm: bool,
    /// Style with ANSI escape codes.
    pub use_color: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            gfm: true,
            use_color: true,
        }
    }
}

/// Renders `text` for the terminal.
///
/// The result never ends with a newline.
pub fn render(text: &str, options: &MarkdownOptions) -> String {
    let mut parser_options = Options::empty();
    if options.gfm {
        parser_options.insert(Options::ENABLE_TABLES);
        parser_options.insert(Options::ENABLE_STRIKETHROUGH);
        parser_options.insert(Options::ENABLE_TASKLISTS);
    }
    let mut writer = Writer::new(options.use_color);
    for event in Parser::new_ext(text, parser_options) {
        writer.event(event);
    }
    writer.finish()
}

/// An open element, recorded so the matching end event needs no inspection.
enum Open {
    Block,
    Heading,
    Quote,
    CodeBlock,
    List,
    Item,
    Styled,
    Literal(&'static str),
    Link(String),
    Table,
    TableHead,
    TableRow,
    TableCell,
    Other,
}

#[derive(Default)]
struct Table {
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
    head_rows: usize,
}

impl Table {
    fn lines(&self) -> Vec<(String, bool)> {
        let columns = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut widths = vec![3; columns];
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.width());
            }
        }
        let mut lines = Vec::new();
        for (r, row) in self.rows.iter().enumerate() {
            let mut line = String::from("|");
            for (i, width) in widths.iter().enumerate() {
                let cell = row.get(i).map(String::as_str).unwrap_or("");
                line.push(' ');
                line.push_str(cell);
                line.push_str(&" ".repeat(width - cell.width()));
                line.push_str(" |");
            }
            let is_head = r < self.head_rows;
            lines.push((line, is_head));
            if is_head && r + 1 == self.head_rows {
                let mut rule = String::from("|");
                for width in &widths {
                    rule.push_str(&"-".repeat(width + 2));
                    rule.push('|');
                }
                lines.push((rule, false));
            }
        }
        lines
    }
}

struct Writer {
    use_color: bool,
    out: String,
    open: Vec<Open>,
    styles: Vec<&'static str>,
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    table: Option<Table>,
    link_text: String,
    at_line_start: bool,
    after_marker: bool,
}

impl Writer {
    fn new(use_color: bool) -> Self {
        Self {
            use_color,
            out: String::new(),
            open: Vec::new(),
            styles: Vec::new(),
            lists: Vec::new(),
            quote_depth: 0,
            table: None,
            link_text: String::new(),
            at_line_start: true,
            after_marker: false,
        }
    }

    fn finish(mut self) -> String {
        if self.use_color && !self.styles.is_empty() {
            self.out.push_str(ANSI_RESET);
        }
        let trimmed = self.out.trim_end_matches(['\n', ' ']).len();
        self.out.truncate(trimmed);
        self.out
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => self.end(),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => self.inline_code(&code),
            Event::Html(html) | Event::InlineHtml(html) => self.text(&html),
            Event::SoftBreak | Event::HardBreak => self.newline(),
            Event::Rule => {
                self.block_break();
                let rule = if self.use_color { "─".repeat(40) } else { "---".to_string() };
                self.write(&rule);
                self.newline();
            }
            Event::TaskListMarker(checked) => {
                self.write(if checked { "[x] " } else { "[ ] " });
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        let open = match tag {
            Tag::Paragraph => {
                self.block_break();
                Open::Block
            }
            Tag::Heading { level, .. } => {
                self.block_break();
                if self.use_color {
                    self.push_style(ANSI_BOLD);
                    self.push_style(ANSI_CYAN);
                } else {
                    self.write(&format!("{} ", "#".repeat(level as usize)));
                }
                Open::Heading
            }
            Tag::BlockQuote(_) => {
                self.block_break();
                self.quote_depth += 1;
                Open::Quote
            }
            Tag::CodeBlock(_) => {
                self.block_break();
                if self.use_color {
                    self.push_style(ANSI_DIM);
                }
                Open::CodeBlock
            }
            Tag::List(start) => {
                if self.lists.is_empty() {
                    self.block_break();
                } else {
                    self.end_line();
                }
                self.lists.push(start);
                Open::List
            }
            Tag::Item => {
                self.end_line();
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ if self.use_color => "• ".to_string(),
                    _ => "- ".to_string(),
                };
                self.write(&format!("{indent}{marker}"));
                self.after_marker = true;
                Open::Item
            }
            Tag::Table(_) => {
                self.block_break();
                self.table = Some(Table::default());
                Open::Table
            }
            Tag::TableHead => Open::TableHead,
            Tag::TableRow => Open::TableRow,
            Tag::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.clear();
                }
                Open::TableCell
            }
            Tag::Emphasis => self.inline_style(ANSI_ITALIC, ""),
            Tag::Strong => self.inline_style(ANSI_BOLD, ""),
            Tag::Strikethrough => self.inline_style(ANSI_STRIKE, "~~"),
            Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. } => {
                self.link_text.clear();
                Open::Link(dest_url.to_string())
            }
            _ => Open::Other,
        };
        self.open.push(open);
    }

    fn end(&mut self) {
        let Some(open) = self.open.pop() else {
            return;
        };
        match open {
            Open::Block | Open::Other => {}
            Open::Heading => {
                if self.use_color {
                    self.pop_style();
                    self.pop_style();
                }
                self.end_line();
            }
            Open::Quote => {
                self.end_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            Open::CodeBlock => {
                if self.use_color {
                    self.pop_style();
                }
                self.end_line();
            }
            Open::List => {
                self.lists.pop();
                self.end_line();
            }
            Open::Item => self.end_line(),
            Open::Styled => self.pop_style(),
            Open::Literal(marker) => self.write(marker),
            Open::Link(url) => {
                if !url.is_empty() && url != self.link_text {
                    self.write(&format!(" ({url})"));
                }
            }
            Open::Table => {
                if let Some(table) = self.table.take() {
                    for (line, is_head) in table.lines() {
                        if is_head && self.use_color {
                            self.write(&format!("{ANSI_BOLD}{line}{ANSI_RESET}"));
                        } else {
                            self.write(&line);
                        }
                        self.newline();
                    }
                }
            }
            Open::TableHead => self.finish_row(true),
            Open::TableRow => self.finish_row(false),
            Open::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    let cell = std::mem::take(&mut table.cell);
                    table.row.push(cell.trim().to_string());
                }
            }
        }
    }

    fn finish_row(&mut self, head: bool) {
        if let Some(table) = self.table.as_mut() {
            let row = std::mem::take(&mut table.row);
            table.rows.push(row);
            if head {
                table.head_rows = table.rows.len();
            }
        }
    }

    fn inline_style(&mut self, code: &'static str, plain: &'static str) -> Open {
        if self.use_color && self.table.is_none() {
            self.push_style(code);
            Open::Styled
        } else {
            self.write(plain);
            Open::Literal(plain)
        }
    }

    fn push_style(&mut self, code: &'static str) {
        self.styles.push(code);
        self.out.push_str(code);
    }

    fn pop_style(&mut self) {
        self.styles.pop();
        self.out.push_str(ANSI_RESET);
        for code in &self.styles {
            self.out.push_str(code);
        }
    }

    fn in_code_block(&self) -> bool {
        self.open.iter().any(|o| matches!(o, Open::CodeBlock))
    }

    fn text(&mut self, text: &str) {
        if self.open.iter().any(|o| matches!(o, Open::Link(_))) {
            self.link_text.push_str(text);
        }
        if self.in_code_block() {
            for line in text.lines() {
                self.write("    ");
                self.write(line);
                self.newline();
            }
            return;
        }
        let mut lines = text.split('\n');
        if let Some(first) = lines.next() {
            self.write(first);
        }
        for line in lines {
            self.newline();
            self.write(line);
        }
    }

    fn inline_code(&mut self, code: &str) {
        if self.use_color && self.table.is_none() {
            self.out.push_str(ANSI_YELLOW);
            self.write(code);
            self.out.push_str(ANSI_RESET);
            for style in &self.styles {
                self.out.push_str(style);
            }
        } else {
            self.write(&format!("`{code}`"));
        }
    }

    /// Writes text on the current line, starting it if needed.
    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(table) = self.table.as_mut() {
            table.cell.push_str(text);
            return;
        }
        self.after_marker = false;
        if self.at_line_start {
            for _ in 0..self.quote_depth {
                self.out.push_str(if self.use_color { "│ " } else { "> " });
            }
            self.at_line_start = false;
        }
        self.out.push_str(text);
    }

    fn newline(&mut self) {
        if let Some(table) = self.table.as_mut() {
            table.cell.push(' ');
            return;
        }
        self.out.push('\n');
        self.at_line_start = true;
    }

    /// Ends the current line unless nothing has been written on it.
    fn end_line(&mut self) {
        if !self.at_line_start {
            self.newline();
        }
    }

    /// Separates a new block from what came before.
    fn block_break(&mut self) {
        if self.after_marker {
            return;
        }
        self.end_line();
        if self.out.is_empty() || !self.lists.is_empty() {
            return;
        }
        let trailing = self.out.len() - self.out.trim_end_matches('\n').len();
        if trailing < 2 {
            self.newline();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: MarkdownOptions = MarkdownOptions {
        gfm: true,
        use_color: false,
    };

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(render("Hi there!", &PLAIN), "Hi there!");
    }

    #[test]
    fn emphasis_is_stripped_without_color() {
        assert_eq!(
            render("We tutor **math** and *science*.", &PLAIN),
            "We tutor math and science."
        );
    }

    #[test]
    fn emphasis_is_styled_with_color() {
        let out = render("**Book** now", &MarkdownOptions::default());
        assert!(out.starts_with(ANSI_BOLD));
        assert!(out.contains("Book"));
        assert!(out.contains(ANSI_RESET));
    }

    #[test]
    fn paragraphs_are_separated_by_a_blank_line() {
        assert_eq!(render("One.\n\nTwo.", &PLAIN), "One.\n\nTwo.");
    }

    #[test]
    fn lists() {
        let out = render("Steps:\n\n1. Fill the form\n2. Get matched\n\n- Zoom\n- Email", &PLAIN);
        assert_eq!(
            out,
            "Steps:\n\n1. Fill the form\n2. Get matched\n\n- Zoom\n- Email"
        );
    }

    #[test]
    fn nested_list_is_indented() {
        let out = render("- Math\n  - Algebra\n- Science", &PLAIN);
        assert_eq!(out, "- Math\n  - Algebra\n- Science");
    }

    #[test]
    fn loose_list_keeps_text_beside_marker() {
        let out = render("- Math\n\n- Science", &PLAIN);
        assert_eq!(out, "- Math\n- Science");
    }

    #[test]
    fn task_list() {
        let out = render("- [x] Sign up\n- [ ] Book", &PLAIN);
        assert_eq!(out, "- [x] Sign up\n- [ ] Book");
    }

    #[test]
    fn table_is_aligned() {
        let text = "| Subject | Grades |\n|---|---|\n| Math | 6-12 |\n| Physics | 9-12 |";
        let out = render(text, &PLAIN);
        assert_eq!(
            out,
            "| Subject | Grades |\n\
             |---------|--------|\n\
             | Math    | 6-12   |\n\
             | Physics | 9-12   |"
        );
    }

    #[test]
    fn table_ignored_without_gfm() {
        let options = MarkdownOptions {
            gfm: false,
            use_color: false,
        };
        let out = render("| a | b |\n|---|---|\n| 1 | 2 |", &options);
        assert_eq!(out, "| a | b |\n|---|---|\n| 1 | 2 |");
    }

    #[test]
    fn strikethrough_kept_as_markers_in_plain_mode() {
        assert_eq!(render("~~old~~ new", &PLAIN), "~~old~~ new");
    }

    #[test]
    fn links_show_their_target() {
        assert_eq!(
            render("See [the form](https://example.com/form).", &PLAIN),
            "See the form (https://example.com/form)."
        );
        assert_eq!(
            render("<https://example.com>", &PLAIN),
            "https://example.com"
        );
    }

    #[test]
    fn inline_and_block_code() {
        assert_eq!(render("Use `x = 2`.", &PLAIN), "Use `x = 2`.");
        assert_eq!(
            render("```\nlet x = 1;\n```", &PLAIN),
            "    let x = 1;"
        );
    }

    #[test]
    fn headings_and_quotes() {
        assert_eq!(render("## Pricing", &PLAIN), "## Pricing");
        assert_eq!(render("> Every session helps.", &PLAIN), "> Every session helps.");
    }

    #[test]
    fn wide_characters_measure_by_display_width() {
        let out = render("| A | B |\n|---|---|\n| ✨ | x |", &PLAIN);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0].width(), lines[2].width());
    }
}
