use pulldown_cmark::{html, Options, Parser};

/// Render assistant markdown to HTML and strip anything unsafe
/// (scripts, event handlers, `javascript:` links).
pub fn render_markdown(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(source, options);
    let mut unsafe_html = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut unsafe_html, parser);

    ammonia::clean(&unsafe_html)
}

/// Escape user-authored text for literal display. No markdown is interpreted.
pub fn escape_text(source: &str) -> String {
    ammonia::clean_text(source)
}
