//! Server-rendered pages. Every value that originates from a user is passed
//! through `html_escape` before it reaches the markup.

use crate::domain::Provider;
use crate::services::SecretEntry;

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en"><head>
<meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1">
<title>{title} | Secrets</title>
<link rel="stylesheet" href="/css/styles.css">
</head><body>
{body}
<footer class="footer"><p>Secrets</p></footer>
</body></html>"#
    )
}

fn provider_buttons(providers: &[Provider], verb: &str) -> String {
    providers
        .iter()
        .map(|p| {
            format!(
                r#"<a class="btn btn-block btn-{slug}" href="/auth/{slug}" role="button">{verb} with {name}</a>"#,
                slug = p.slug(),
                name = p.display_name(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n    ")
}

#[must_use]
pub fn home() -> String {
    layout(
        "Home",
        r#"<div class="jumbotron centered">
  <h1 class="display-3">Secrets</h1>
  <p class="lead">Don't keep your secrets, share them anonymously!</p>
  <hr>
  <a class="btn btn-light btn-lg" href="/register" role="button">Register</a>
  <a class="btn btn-dark btn-lg" href="/login" role="button">Login</a>
</div>"#,
    )
}

fn credentials_form(action: &str, submit: &str, password_autocomplete: &str) -> String {
    format!(
        r#"<form action="{action}" method="POST">
    <div class="form-group">
      <label for="username">Username</label>
      <input type="text" class="form-control" id="username" name="username" required autocomplete="username">
    </div>
    <div class="form-group">
      <label for="password">Password</label>
      <input type="password" class="form-control" id="password" name="password" required autocomplete="{password_autocomplete}">
    </div>
    <button type="submit" class="btn btn-dark">{submit}</button>
  </form>"#
    )
}

#[must_use]
pub fn login(providers: &[Provider]) -> String {
    let body = format!(
        r#"<div class="container">
  <h1>Login</h1>
  {form}
  <div class="providers">
    {buttons}
  </div>
  <p>No account yet? <a href="/register">Register</a></p>
</div>"#,
        form = credentials_form("/login", "Login", "current-password"),
        buttons = provider_buttons(providers, "Sign In"),
    );
    layout("Login", &body)
}

#[must_use]
pub fn register(providers: &[Provider]) -> String {
    let body = format!(
        r#"<div class="container">
  <h1>Register</h1>
  {form}
  <div class="providers">
    {buttons}
  </div>
  <p>Already registered? <a href="/login">Login</a></p>
</div>"#,
        form = credentials_form("/register", "Register", "new-password"),
        buttons = provider_buttons(providers, "Sign Up"),
    );
    layout("Register", &body)
}

/// The public board. Authors are not shown; only the text is.
#[must_use]
pub fn secrets(entries: &[SecretEntry], signed_in: bool) -> String {
    let items = if entries.is_empty() {
        r#"<p class="secret-text empty">No secrets yet.</p>"#.to_string()
    } else {
        entries
            .iter()
            .map(|entry| {
                format!(
                    r#"<p class="secret-text">{}</p>"#,
                    html_escape::encode_text(&entry.text)
                )
            })
            .collect::<Vec<_>>()
            .join("\n  ")
    };

    let actions = if signed_in {
        r#"<a class="btn btn-light btn-lg" href="/logout" role="button">Log Out</a>
  <a class="btn btn-dark btn-lg" href="/submit" role="button">Submit a Secret</a>"#
    } else {
        r#"<a class="btn btn-dark btn-lg" href="/login" role="button">Login to share one</a>"#
    };

    let body = format!(
        r#"<div class="jumbotron text-center">
  <div class="container">
  <h1 class="display-3">You've Discovered My Secret!</h1>
  {items}
  <hr>
  {actions}
  </div>
</div>"#
    );
    layout("Secrets", &body)
}

#[must_use]
pub fn submit(max_length: usize) -> String {
    let body = format!(
        r#"<div class="container">
  <div class="jumbotron centered">
    <h1 class="display-3">Secrets</h1>
    <p class="secret-text">Don't keep your secrets, share them anonymously!</p>
    <form action="/submit" method="POST">
      <div class="form-group">
        <input type="text" class="form-control" name="secret" placeholder="What's your secret?" required maxlength="{max_length}">
      </div>
      <button type="submit" class="btn btn-dark">Submit</button>
    </form>
  </div>
</div>"#
    );
    layout("Submit", &body)
}

/// Generic failure page. `message` must never carry internal details.
#[must_use]
pub fn error_page(status: u16, message: &str) -> String {
    let body = format!(
        r#"<div class="container centered">
  <h1>{status}</h1>
  <p>{message}</p>
  <a class="btn btn-dark" href="/" role="button">Home</a>
</div>"#,
        message = html_escape::encode_text(message),
    );
    layout("Error", &body)
}
