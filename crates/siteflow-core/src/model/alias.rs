//! エイリアスドメイン

use serde::{Deserialize, Serialize};

/// 挿入順を保持する重複なしのホスト名集合
///
/// 先頭は常にプライマリURLです。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasDomains(Vec<String>);

impl AliasDomains {
    /// プライマリURLのみの集合を作成
    pub fn new(primary: impl Into<String>) -> Self {
        Self(vec![primary.into()])
    }

    /// 順序を保持して追加（既存のものは無視）
    pub fn push(&mut self, domain: &str) {
        let domain = domain.trim().to_lowercase();
        if domain.is_empty() || self.0.contains(&domain) {
            return;
        }
        self.0.push(domain);
    }

    /// サブドメインマルチサイト用のワイルドカードを追加
    pub fn push_wildcard(&mut self) {
        let wildcard = format!("*.{}", self.primary());
        self.push(&wildcard);
    }

    /// カンマ区切りの文字列から追加
    pub fn extend_csv(&mut self, csv: &str) {
        for domain in csv.split(',') {
            self.push(domain);
        }
    }

    pub fn primary(&self) -> &str {
        &self.0[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// プライマリ以外のドメイン
    pub fn extras(&self) -> impl Iterator<Item = &str> {
        self.iter().skip(1)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// VIRTUAL_HOST などで使うカンマ区切り表現
    pub fn joined(&self) -> String {
        self.0.join(",")
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.0.iter().any(|d| d == domain)
    }
}
