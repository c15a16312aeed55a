use rand::distributions::Alphanumeric;
use rand::Rng;
use url::Url;

const SALT_LENGTH: usize = 16;

/// How the client proves itself to the server. Every request carries the
/// credentials in its query string, so a fresh salt is drawn per request.
#[derive(Clone)]
pub enum Credentials {
    /// Salted token auth, available since API 1.13.0. The password never
    /// travels over the wire.
    Token { username: String, password: String },
    /// Plain password auth for servers predating token support.
    Password { username: String, password: String },
}

impl Credentials {
    pub(crate) fn apply(&self, url: &mut Url) {
        match self {
            Credentials::Token { username, password } => {
                let salt: String = rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(SALT_LENGTH)
                    .map(char::from)
                    .collect();
                let token = format!("{:x}", md5::compute(format!("{password}{salt}")));

                url.query_pairs_mut()
                    .append_pair("u", username)
                    .append_pair("t", &token)
                    .append_pair("s", &salt);
            }
            Credentials::Password { username, password } => {
                url.query_pairs_mut()
                    .append_pair("u", username)
                    .append_pair("p", password);
            }
        }
    }
}
