//! Login and logout against the SugarWOD web app.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use sw2tg_core::{Error, Result};

use crate::{
    cookies::{Cookie, CookieJar},
    csrf::extract_csrf,
    dto::{LoginRequest, LoginResponse},
    network, SugarWodClient,
};

const SESSION_COOKIE: &str = "_sw_session";
const SESSION_SEED: &str = r#"{"csrfSecret":"AOxLG4VFdmtmTfgSHvt0-Z6r","token":null}"#;

/// One authenticated span: its own cookie jar, never shared.
#[derive(Debug)]
pub struct Session {
    pub(crate) jar: CookieJar,
    pub token: Option<String>,
    pub affiliate_id: Option<String>,
}

impl Session {
    fn seeded() -> Self {
        let mut jar = CookieJar::new();
        jar.insert(Cookie::new(SESSION_COOKIE, STANDARD.encode(SESSION_SEED)));
        Self {
            jar,
            token: None,
            affiliate_id: None,
        }
    }

    pub fn cookie_header(&self) -> Option<String> {
        self.jar.header_value()
    }
}

impl SugarWodClient {
    pub async fn login(&self) -> Result<Session> {
        tracing::info!("login");
        let mut session = Session::seeded();

        let page = self
            .get_text(&mut session, &self.settings.login_page, &[])
            .await?;
        let csrf = extract_csrf(&page);

        let body = LoginRequest {
            username: &self.settings.username,
            password: &self.settings.password,
            method: "post",
            csrf,
        };
        let resp = self
            .with_cookies(
                self.http.post(self.url(&self.settings.login_api)).json(&body),
                &session,
            )
            .send()
            .await
            .map_err(network)?;
        session.jar.merge(resp.headers());

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Auth(format!("login rejected with {status}")));
        }
        if !status.is_success() {
            return Err(Error::Network(format!("login failed with {status}")));
        }

        let text = resp.text().await.map_err(network)?;
        let login: LoginResponse = serde_json::from_str(&text)
            .map_err(|e| Error::Auth(format!("malformed login response: {e}")))?;
        let data = login
            .data
            .ok_or_else(|| Error::Auth("login response without data".to_string()))?;

        match &data.session_token {
            Some(_) => tracing::info!(
                "got session token for user {}",
                data.object_id.as_deref().unwrap_or("?")
            ),
            None => tracing::warn!("got no session token"),
        }
        session.token = data.session_token;
        session.affiliate_id = data.affiliate.and_then(|a| a.object_id);
        Ok(session)
    }

    /// Best effort: failures are logged, never returned.
    pub async fn logout(&self, session: &mut Session) {
        tracing::info!("logout");
        if let Err(e) = self
            .get_text(session, &self.settings.logout_page, &[])
            .await
        {
            tracing::error!("Error at logout {e}");
        }
    }
}
