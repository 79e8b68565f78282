//! Server-rendered HTML for the upload form and the result page.

use crate::engine::RecognizeOutput;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use facematch_core::imaging;
use std::fmt::Write as _;

const STYLE: &str = "body{font-family:sans-serif;max-width:960px;margin:2em auto;padding:0 1em}\
.status{margin:.25em 0}.warn{color:#a15c00}.error{color:#b00020}\
.images{display:flex;gap:1em;flex-wrap:wrap}.images figure{margin:0;flex:1 1 420px}\
.images img{max-width:100%}";

/// Escape text for HTML element content and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// `data:` URI for JPEG or PNG bytes.
pub fn data_uri(bytes: &[u8]) -> String {
    let mime = imaging::mime_type(bytes).unwrap_or("application/octet-stream");
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

fn layout(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
<title>facematch</title><style>{STYLE}</style></head>\n<body>\n<h1>Face recognition</h1>\n\
{body}</body></html>\n"
    )
}

fn upload_form() -> &'static str {
    "<form action=\"/recognize\" method=\"post\" enctype=\"multipart/form-data\">\
<label>Choose an image <input type=\"file\" name=\"image\" accept=\".jpg,.jpeg,.png\"></label> \
<button type=\"submit\">Recognize</button></form>\n"
}

pub fn index_page() -> String {
    layout(upload_form())
}

/// Status messages, the uploaded image and the annotated result.
pub fn result_page(output: &RecognizeOutput) -> String {
    let mut body = String::from(upload_form());

    let gallery = &output.gallery;
    for skipped in &gallery.skipped {
        status_line(&mut body, "warn", &skipped.to_string());
    }
    status_line(
        &mut body,
        "",
        &format!("{} known faces loaded", gallery.identities.len()),
    );
    status_line(
        &mut body,
        "",
        &format!("Faces detected: {}", output.recognition.detected),
    );

    for (i, face) in output.recognition.faces.iter().enumerate() {
        let _ = write!(
            body,
            "<h3>Face {}: {}</h3>\n<ul>\n",
            i + 1,
            escape(&face.result.caption())
        );
        for score in &face.scores {
            let _ = writeln!(
                body,
                "<li>&rarr; similarity with {}: {:.2}</li>",
                escape(&score.name),
                score.similarity
            );
        }
        body.push_str("</ul>\n");
    }

    let _ = write!(
        body,
        "<div class=\"images\">\
<figure><img src=\"{}\" alt=\"Uploaded image\"><figcaption>Uploaded image</figcaption></figure>\
<figure><img src=\"{}\" alt=\"Recognition result\"><figcaption>Recognition result</figcaption></figure>\
</div>\n",
        data_uri(&output.uploaded),
        data_uri(&output.annotated_png)
    );

    layout(&body)
}

/// Upload form with an error or warning message above it.
pub fn message_page(class: &str, message: &str) -> String {
    let mut body = String::new();
    status_line(&mut body, class, message);
    body.push_str(upload_form());
    layout(&body)
}

fn status_line(body: &mut String, class: &str, message: &str) {
    let _ = writeln!(
        body,
        "<p class=\"status {class}\">{}</p>",
        escape(message)
    );
}
