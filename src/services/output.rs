use crate::domain::errors::LimriError;
use crate::domain::models::{ErrorBody, JsonErr, JsonOut};
use serde::Serialize;

pub fn print_out<T: Serialize>(
    json: bool,
    data: &[T],
    row: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&JsonOut { ok: true, data })?
        );
    } else {
        for d in data {
            println!("{}", row(d));
        }
    }
    Ok(())
}

pub fn print_one<T: Serialize>(
    json: bool,
    data: T,
    row: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&JsonOut { ok: true, data })?
        );
    } else {
        println!("{}", row(&data));
    }
    Ok(())
}

/// Error envelope for `--json`; untyped failures get the code `ERROR`.
pub fn error_body(err: &anyhow::Error) -> JsonErr {
    let code = err
        .downcast_ref::<LimriError>()
        .map(|e| e.code())
        .unwrap_or("ERROR");
    JsonErr {
        ok: false,
        error: ErrorBody {
            code: code.to_string(),
            message: format!("{:#}", err),
        },
    }
}

pub fn print_error(json: bool, err: &anyhow::Error) {
    if json {
        match serde_json::to_string_pretty(&error_body(err)) {
            Ok(text) => println!("{}", text),
            Err(_) => eprintln!("error: {:#}", err),
        }
    } else {
        eprintln!("error: {:#}", err);
    }
}
