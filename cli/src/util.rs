use serde_json::{Value, json};

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

fn render(value: &Value, raw: bool) -> String {
    let rendered = if raw {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    rendered.unwrap_or_else(|_| value.to_string())
}

pub fn print_json(value: &Value, raw: bool) {
    println!("{}", render(value, raw));
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", render(&err, false));
    std::process::exit(4);
}

/// Exit code for an HTTP status: 0=2xx, 1=4xx, 2=everything else.
pub fn exit_code_for(status: u16) -> i32 {
    match status {
        200..=299 => 0,
        400..=499 => 1,
        _ => 2,
    }
}

/// Execute an API request, print the JSON response, return the exit code.
///
/// Exit codes: 0=success (2xx), 1=client error (4xx), 2=server error (5xx),
///             3=connection error, 4=usage error
pub async fn api_request(
    api_url: &str,
    method: reqwest::Method,
    path: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
    raw: bool,
) -> i32 {
    let url = match reqwest::Url::parse(&format!("{}{path}", api_url.trim_end_matches('/'))) {
        Ok(url) => url,
        Err(e) => {
            let err = json!({
                "error": "cli_error",
                "message": format!("Invalid URL: {api_url}{path}: {e}")
            });
            eprintln!("{}", render(&err, raw));
            return 4;
        }
    };

    tracing::debug!(%url, %method, "Sending API request");
    let mut req = client().request(method, url);
    for (name, value) in headers {
        req = req.header(*name, *value);
    }
    if let Some(body) = body {
        req = req.json(&body);
    }

    let resp = match req.send().await {
        Ok(resp) => resp,
        Err(e) => {
            let err = json!({
                "error": "connection_error",
                "message": format!("{e}"),
                "docs_hint": "Is the API server running? Check CUOTA_API_URL."
            });
            eprintln!("{}", render(&err, raw));
            return 3;
        }
    };

    let status = resp.status().as_u16();
    let exit_code = exit_code_for(status);
    let body: Value = match resp.json().await {
        Ok(value) => value,
        Err(e) => json!({"raw_error": format!("Failed to parse response as JSON: {e}")}),
    };

    if exit_code == 0 {
        println!("{}", render(&body, raw));
    } else {
        eprintln!("{}", render(&body, raw));
    }
    exit_code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_exit_codes() {
        assert_eq!(exit_code_for(200), 0);
        assert_eq!(exit_code_for(422), 1);
        assert_eq!(exit_code_for(429), 1);
        assert_eq!(exit_code_for(502), 2);
    }

    #[test]
    fn raw_rendering_is_single_line() {
        let value = json!({"answer_text": "Se encontraron 3 registro(s)."});
        assert!(!render(&value, true).contains('\n'));
        assert!(render(&value, false).contains('\n'));
    }
}
