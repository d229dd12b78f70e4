use crate::server::AppState;
use axum::extract::State;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};

/// Serve an asset from the override directory when present, otherwise the
/// embedded fallback.
async fn serve_asset(
    state: &AppState,
    file_name: &str,
    content_type: &'static str,
    embedded: fn() -> String,
) -> Response {
    let path = state.config.assets_dir.join(file_name);
    let body = match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(_) => embedded(),
    };
    let mut resp = Response::new(body.into());
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

pub async fn serve_chat_page(State(state): State<AppState>) -> impl IntoResponse {
    serve_asset(&state, "chat.html", "text/html; charset=utf-8", chat_page).await
}

pub async fn serve_report_page(State(state): State<AppState>) -> impl IntoResponse {
    serve_asset(&state, "report.html", "text/html; charset=utf-8", report_page).await
}

pub async fn serve_widget_script(State(state): State<AppState>) -> impl IntoResponse {
    serve_asset(
        &state,
        "widget.js",
        "application/javascript",
        crate::sdk::widget_script,
    )
    .await
}

pub async fn serve_report_script(State(state): State<AppState>) -> impl IntoResponse {
    serve_asset(
        &state,
        "report.js",
        "application/javascript",
        crate::sdk::report_script,
    )
    .await
}

fn chat_page() -> String {
    r#"<!doctype html>
<html lang="he" dir="rtl">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>בדיקת זכויות</title>
  <style>
    body { font-family: sans-serif; max-width: 40rem; margin: 2rem auto; }
    #chatbox { border: 1px solid #ccc; height: 24rem; overflow-y: auto; padding: 0.5rem; }
    .message { margin: 0.25rem 0; }
    .message.user { text-align: left; color: #1a4d8f; }
    #reportButton { display: none; margin-top: 0.5rem; }
  </style>
</head>
<body>
  <h1>בדיקת זכויות</h1>
  <div id="chatbox"></div>
  <input id="userInput" type="text" placeholder="הקלידו תשובה...">
  <button onclick="ZakautChat.sendMessage()">שלח</button>
  <button id="reportButton">לצפייה בדוח הזכויות</button>
  <script src="/assets/widget.js"></script>
</body>
</html>
"#
    .to_string()
}

fn report_page() -> String {
    r#"<!doctype html>
<html lang="he" dir="rtl">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>דוח הזכויות שלך</title>
  <style>
    body { font-family: sans-serif; max-width: 40rem; margin: 2rem auto; }
    #rightsContainer div { margin: 0.25rem 0; }
    form { margin-top: 1.5rem; display: grid; gap: 0.5rem; max-width: 20rem; }
  </style>
</head>
<body>
  <h1>דוח הזכויות שלך</h1>
  <div id="rightsContainer"></div>
  <h2>השאירו פרטים ונחזור אליכם</h2>
  <form onsubmit="return false">
    <input id="leadName" type="text" placeholder="שם מלא">
    <input id="leadPhone" type="text" placeholder="טלפון">
    <input id="leadEmail" type="text" placeholder="אימייל">
    <button id="sendLead">שליחה</button>
  </form>
  <script src="/assets/report.js"></script>
</body>
</html>
"#
    .to_string()
}
