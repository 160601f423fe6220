use async_trait::async_trait;

use crate::{error::ProviderError, settings::Settings};

/// NetGSM answers with a plain-text status; these prefixes mean accepted.
const NETGSM_OK_PREFIXES: [&str; 3] = ["00", "01", "02"];

#[derive(Clone, Debug)]
pub struct SmsCredentials {
    pub usercode: String,
    pub password: String,
    pub msg_header: String,
}

impl SmsCredentials {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            usercode: settings.netgsm_usercode.clone(),
            password: settings.netgsm_password.clone(),
            msg_header: settings.netgsm_msg_header.clone(),
        }
    }
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(
        &self,
        credentials: &SmsCredentials,
        phone: &str,
        message: &str,
    ) -> Result<(), ProviderError>;
}

pub struct NetgsmClient {
    http: reqwest::Client,
    url: String,
}

impl NetgsmClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SmsGateway for NetgsmClient {
    async fn send(
        &self,
        credentials: &SmsCredentials,
        phone: &str,
        message: &str,
    ) -> Result<(), ProviderError> {
        if credentials.usercode.trim().is_empty() {
            return Err(ProviderError::NotConfigured("netgsm usercode missing"));
        }

        let gsmno = normalize_phone(phone);
        let response = self
            .http
            .get(&self.url)
            .query(&[
                ("usercode", credentials.usercode.as_str()),
                ("password", credentials.password.as_str()),
                ("gsmno", gsmno.as_str()),
                ("message", message),
                ("msgheader", credentials.msg_header.as_str()),
                ("dil", "TR"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if !gateway_accepted(&body) {
            return Err(ProviderError::Rejected(body.trim().to_string()));
        }
        log::info!("SMS accepted by gateway for {}", mask_phone(&gsmno));
        Ok(())
    }
}

fn gateway_accepted(body: &str) -> bool {
    let body = body.trim_start();
    NETGSM_OK_PREFIXES.iter().any(|prefix| body.starts_with(prefix))
}

/// Digits only, with a national leading `0` rewritten to the `90` country code.
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix('0') {
        Some(rest) => format!("90{rest}"),
        None => digits,
    }
}

pub fn mask_phone(phone: &str) -> String {
    let visible: String = phone
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("***{visible}")
}

/// Rewrites Turkish letters to their ASCII base and drops whatever else the
/// gateway's GSM alphabet would mangle.
pub fn strip_diacritics(text: &str) -> String {
    text.chars()
        .filter_map(|ch| match ch {
            'ç' => Some('c'),
            'Ç' => Some('C'),
            'ğ' => Some('g'),
            'Ğ' => Some('G'),
            'ı' | 'î' => Some('i'),
            'İ' | 'Î' => Some('I'),
            'ö' => Some('o'),
            'Ö' => Some('O'),
            'ş' => Some('s'),
            'Ş' => Some('S'),
            'ü' | 'û' => Some('u'),
            'Ü' | 'Û' => Some('U'),
            'â' => Some('a'),
            'Â' => Some('A'),
            ch if ch.is_ascii() => Some(ch),
            _ => None,
        })
        .collect()
}
