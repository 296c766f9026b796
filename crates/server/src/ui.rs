// HTML pages for the credential registration flow

const CONNECT_TEMPLATE: &str = include_str!("connect.html");

/// Registration form, pre-filled with `client_id`
pub fn render_connect_form(client_id: &str) -> String {
    CONNECT_TEMPLATE.replace("{{client_id}}", &escape_html(client_id))
}

/// Confirmation shown after a successful registration
pub fn render_connected(client_id: &str) -> String {
    format!(
        concat!(
            "<!doctype html>\n",
            "<html><head><meta charset=\"utf-8\"><title>OpenPaye access saved</title></head>\n",
            "<body><p>OpenPaye access saved for client <strong>{}</strong>. ",
            "You can close this page and return to your agent.</p></body></html>\n"
        ),
        escape_html(client_id)
    )
}

/// Escape text for use in HTML content and double-quoted attributes
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
