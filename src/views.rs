use axum::response::Html;

use crate::model::Guest;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n{body}</body>\n</html>\n"
    ))
}

pub fn hello(name: Option<&str>, signed_in: bool) -> Html<String> {
    let greeting = match name {
        Some(name) => format!("<h1>Hello, {}!</h1>\n", escape(name)),
        None => "<h1>Hello, World!</h1>\n".to_string(),
    };
    let auth_link = if signed_in {
        "<p><a href=\"/logout\">Log out</a></p>\n"
    } else {
        "<p><a href=\"/login\">Log in</a></p>\n"
    };
    let form = "<form method=\"post\" action=\"/submit_form\">\n\
        <label>First name <input name=\"firstname\"></label>\n\
        <label>Last name <input name=\"lastname\"></label>\n\
        <label>Phone <input name=\"phone\" inputmode=\"numeric\"></label>\n\
        <button type=\"submit\">Sign the guest book</button>\n\
        </form>\n";
    layout("Guest book", &format!("{greeting}{auth_link}{form}"))
}

pub fn guest_list(guests: &[Guest]) -> Html<String> {
    let rows: String = guests
        .iter()
        .map(|guest| {
            format!(
                "<tr class=\"guest\"><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape(&guest.firstname),
                escape(&guest.lastname),
                guest.phone
            )
        })
        .collect();
    let body = format!(
        "<h1>Guests</h1>\n<table>\n<tr><th>First name</th><th>Last name</th><th>Phone</th></tr>\n{rows}</table>\n<p><a href=\"/\">Back</a></p>\n"
    );
    layout("Guests", &body)
}
