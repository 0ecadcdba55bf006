//! パスワード検証と生成

use crate::error::{Result, SiteError};
use rand::Rng;
use rand::distributions::Alphanumeric;

/// 管理者パスワードの最小長
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// 管理者パスワードを検証
///
/// 違反したルールをすべて列挙したエラーを返します。
pub fn validate_admin_password(password: &str) -> Result<()> {
    let mut problems = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push(format!(
            "パスワードは{}文字以上にしてください",
            MIN_PASSWORD_LENGTH
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("パスワードには数字を1文字以上含めてください".to_string());
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        problems.push("パスワードには英字を1文字以上含めてください".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(SiteError::WeakPassword(problems))
    }
}

/// 英数字のランダム文字列
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// ランダムなパスワード
pub fn random_password() -> String {
    random_string(18)
}

const ADJECTIVES: &[&str] = &[
    "amazing", "brave", "calm", "eager", "gentle", "happy", "jolly", "kind", "lively", "proud",
    "silly", "witty",
];

const NOUNS: &[&str] = &[
    "badger", "falcon", "gecko", "heron", "koala", "lemur", "otter", "panda", "quokka", "raven",
    "tiger", "walrus",
];

/// ランダムな管理者ユーザー名（例: "brave-otter"）
pub fn random_username() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
    format!("{}-{}", adjective, noun)
}
