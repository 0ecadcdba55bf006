use thiserror::Error;

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("無効なサイトURLです: '{0}'")]
    InvalidUrl(String),

    #[error(
        "サイト {0} は既に存在します\nヒント: 作り直す場合は先に既存サイトを削除してください: siteflow delete {0}"
    )]
    SiteAlreadyExists(String),

    #[error("ドメイン '{domain}' は既にサイト '{site}' で使用されています")]
    AliasInUse { domain: String, site: String },

    #[error(
        "認識できないマルチサイト指定です: {0}\nヒント: `--mu=subdom` または `--mu=subdir` のみ指定できます"
    )]
    InvalidMultisite(String),

    #[error("入力されたパスワードに問題があります:\n{}", .0.iter().map(|m| format!("  * {}", m)).collect::<Vec<_>>().join("\n"))]
    WeakPassword(Vec<String>),

    #[error("サポートされていないPHPバージョンです: {0}")]
    UnsupportedPhpVersion(String),

    #[error("無効なSSL指定です: {0}")]
    InvalidSsl(String),

    #[error("--wildcard または --mu=subdom は --ssl=inherit と同時に指定できません")]
    InheritWithWildcard,

    #[error(
        "--ssl=inherit には親ドメイン '{0}' のワイルドカード証明書付きサイトが必要です"
    )]
    ParentCertMissing(String),

    #[error("リモートDBを使用する場合は `--dbuser` と `--dbpass` の両方が必要です")]
    RemoteDbCredentialsRequired,

    #[error("無効なDBポートです: {0}")]
    InvalidDbPort(String),

    #[error("無効なDBホストです: {0}")]
    InvalidDbHost(String),

    #[error("共有DB '{host}' のポートは変更できません: {port}")]
    GlobalDbPort { host: String, port: u16 },

    #[error("カスタムSSLには {0} が必要です")]
    MissingCustomCert(&'static str),

    #[error("証明書ファイルが見つかりません: {0}")]
    CertFileNotFound(String),

    #[error("無効な公開ディレクトリです: {0}")]
    InvalidPublicDir(String),

    #[error("無効なプロキシキャッシュ設定: {0}")]
    InvalidProxyCache(String),

    #[error("サービス '{service}' は操作できません（指定可能: {allowed}）")]
    UnknownService { service: String, allowed: String },

    #[error(
        "VIP リポジトリを読み取れません: {0}\nヒント: アクセス権とリポジトリの存在を確認してください"
    )]
    VipRepoUnreachable(String),

    #[error("テンプレート展開エラー: {template}\n理由: {message}")]
    TemplateError { template: String, message: String },
}

impl SiteError {
    /// テンプレート展開エラーを生成
    pub fn template(template: impl Into<String>, err: &tera::Error) -> Self {
        // tera のエラーは source チェーンに詳細を持つ
        let mut message = err.to_string();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        SiteError::TemplateError {
            template: template.into(),
            message,
        }
    }
}

pub type Result<T> = std::result::Result<T, SiteError>;
