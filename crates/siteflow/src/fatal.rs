//! 想定外のパニックを致命的エラーとして扱うための補助

use crate::error::ProvisionError;
use std::any::Any;
use std::sync::Mutex;

static LAST_PANIC_LOCATION: Mutex<Option<String>> = Mutex::new(None);

/// パニック発生位置を記録するフックを登録
///
/// 記録した位置は `from_panic` で `ProvisionError::Fatal` に載せます。
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        tracing::error!(
            location = %location,
            "Unrecoverable error (panic): {}",
            payload_message(info.payload())
        );
        if let Ok(mut slot) = LAST_PANIC_LOCATION.lock() {
            *slot = Some(location);
        }
    }));
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// `catch_unwind` で捕まえたパニックを致命的エラーに変換
pub fn from_panic(payload: Box<dyn Any + Send>) -> ProvisionError {
    let location = LAST_PANIC_LOCATION
        .lock()
        .ok()
        .and_then(|mut slot| slot.take())
        .unwrap_or_else(|| "unknown".to_string());
    ProvisionError::Fatal {
        message: format!("panic: {}", payload_message(payload.as_ref())),
        location,
    }
}
