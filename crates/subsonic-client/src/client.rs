use crate::auth::Credentials;
use crate::types::{Envelope, ResponseBody, ResponseStatus, Song};
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Server error code for an object the server does not know.
pub const ERROR_NOT_FOUND: u32 = 70;

#[derive(Debug, thiserror::Error)]
pub enum SubsonicError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported server url: {0}")]
    UnsupportedUrl(String),
    #[error(transparent)]
    TransportError(#[from] reqwest::Error),
    #[error("server error {code}: {message}")]
    ServerError { code: u32, message: String },
}

/// Thin client for the Subsonic REST API as spoken by Subsonic, Navidrome
/// and friends. JSON endpoints go through [`Self::call`]; binary endpoints
/// are only ever built as urls, since the device media stack fetches them
/// itself.
pub struct SubsonicClient {
    client: Client,
    base_url: Url,
    credentials: Credentials,
    client_name: String,
    api_version: String,
}

impl SubsonicClient {
    pub fn create(
        server_url: &str,
        credentials: Credentials,
        client_name: &str,
        api_version: &str,
    ) -> Result<Self, SubsonicError> {
        let mut base_url = Url::parse(server_url)?;

        if base_url.cannot_be_a_base() {
            return Err(SubsonicError::UnsupportedUrl(server_url.to_string()));
        }

        // A trailing slash keeps `join` from eating the last path segment
        // of servers mounted under a subpath.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let client = Client::builder()
            .build()
            .expect("Failed to create HTTP Client");

        Ok(Self {
            client,
            base_url,
            credentials,
            client_name: client_name.to_string(),
            api_version: api_version.to_string(),
        })
    }

    pub async fn ping(&self) -> Result<(), SubsonicError> {
        self.call("ping", &[]).await?;
        Ok(())
    }

    /// `Ok(None)` when the server does not know the id.
    pub async fn get_song(&self, id: &str) -> Result<Option<Song>, SubsonicError> {
        match self.call("getSong", &[("id", id.to_string())]).await {
            Ok(body) => Ok(body.song),
            Err(SubsonicError::ServerError {
                code: ERROR_NOT_FOUND,
                ..
            }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Reports a play. `submission: false` only updates the now-playing
    /// page instead of writing a play record.
    pub async fn scrobble(&self, id: &str, submission: bool) -> Result<(), SubsonicError> {
        self.call(
            "scrobble",
            &[("id", id.to_string()), ("submission", submission.to_string())],
        )
        .await?;

        Ok(())
    }

    pub async fn star(&self, id: &str) -> Result<(), SubsonicError> {
        self.call("star", &[("id", id.to_string())]).await?;
        Ok(())
    }

    pub async fn unstar(&self, id: &str) -> Result<(), SubsonicError> {
        self.call("unstar", &[("id", id.to_string())]).await?;
        Ok(())
    }

    /// Authenticated url for raw audio, with optional transcoding hints.
    pub fn stream_url(&self, id: &str, max_bit_rate: Option<u32>, format: Option<&str>) -> String {
        let mut url = self.media_url("stream", id);

        if let Some(rate) = max_bit_rate {
            url.query_pairs_mut()
                .append_pair("maxBitRate", &rate.to_string());
        }

        if let Some(format) = format {
            url.query_pairs_mut().append_pair("format", format);
        }

        url.into()
    }

    /// Authenticated url for artwork. Takes a cover ref from a song, or a
    /// track id, which servers accept as a fallback.
    pub fn cover_art_url(&self, cover_ref: &str) -> String {
        self.media_url("getCoverArt", cover_ref).into()
    }

    async fn call(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<ResponseBody, SubsonicError> {
        let mut url = self.api_url(method);

        for (key, value) in params {
            url.query_pairs_mut().append_pair(key, value);
        }

        debug!(method, "Calling the Subsonic API");

        let envelope = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<Envelope>()
            .await?;
        let body = envelope.response;

        if body.status == ResponseStatus::Failed {
            let error = body.error.unwrap_or_default();

            return Err(SubsonicError::ServerError {
                code: error.code,
                message: error.message,
            });
        }

        Ok(body)
    }

    fn api_url(&self, method: &str) -> Url {
        let mut url = self.rest_url(method);
        self.credentials.apply(&mut url);
        url.query_pairs_mut()
            .append_pair("v", &self.api_version)
            .append_pair("c", &self.client_name)
            .append_pair("f", "json");

        url
    }

    /// Binary endpoints carry no `f` parameter; the response is the media
    /// itself.
    fn media_url(&self, method: &str, id: &str) -> Url {
        let mut url = self.rest_url(method);
        self.credentials.apply(&mut url);
        url.query_pairs_mut()
            .append_pair("v", &self.api_version)
            .append_pair("c", &self.client_name)
            .append_pair("id", id);

        url
    }

    fn rest_url(&self, method: &str) -> Url {
        self.base_url
            .join(&format!("rest/{method}"))
            .expect("Base url was validated on create")
    }
}
