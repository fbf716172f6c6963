//! A remote stage bound to the output session.

use crate::error::Result;
use crate::session::{StreamSession, pump};
use crate::transport::{ClientMessage, DuplexTransport, SynthesisRequest, TransportOptions};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Connection to one remote stage (synthesis or conversion).
///
/// Audio returned by the stage is pumped into `session`. The connection is
/// opened lazily on first use and reopened by the next send after it drops;
/// there is no background retry.
pub struct StageLink {
    name: &'static str,
    endpoint: String,
    options: TransportOptions,
    speaker: Option<u32>,
    session: Arc<StreamSession>,
    transport: Option<DuplexTransport>,
    pump: Option<JoinHandle<()>>,
}

impl StageLink {
    pub fn new(
        name: &'static str,
        endpoint: String,
        options: TransportOptions,
        session: Arc<StreamSession>,
    ) -> Self {
        Self {
            name,
            endpoint,
            options,
            speaker: None,
            session,
            transport: None,
            pump: None,
        }
    }

    /// Speaker id announced after every connect.
    pub fn with_speaker(mut self, speaker: Option<u32>) -> Self {
        self.speaker = speaker;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.transport.as_ref().is_some_and(DuplexTransport::is_open)
    }

    /// Opens the connection unless one is already open.
    pub async fn ensure_connected(&mut self) -> Result<&DuplexTransport> {
        if !self.is_connected() {
            self.reconnect().await?;
        }
        match self.transport.as_ref() {
            Some(transport) => Ok(transport),
            None => Err(crate::error::VoxchainError::connection(
                &self.endpoint,
                "not connected",
            )),
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.teardown().await;
        self.session.begin_connect();

        let (transport, events) = DuplexTransport::connect(&self.endpoint, &self.options).await?;
        info!(stage = self.name, endpoint = %self.endpoint, "stage connected");

        if let Some(speaker) = self.speaker {
            transport
                .send_message(&ClientMessage::Speaker { speaker })
                .await?;
            debug!(stage = self.name, speaker, "speaker selected");
        }

        self.pump = Some(tokio::spawn(pump(
            Arc::clone(&self.session),
            self.endpoint.clone(),
            events,
        )));
        self.transport = Some(transport);
        Ok(())
    }

    /// Sends one text fragment for synthesis.
    pub async fn send_text(&mut self, text: String) -> Result<()> {
        let session = Arc::clone(&self.session);
        let transport = self.ensure_connected().await?;
        // Armed before the send: replies can arrive before it returns.
        session.mark_sent();
        transport.send_message(&ClientMessage::Text { text }).await
    }

    /// Sends one chunk of PCM16 audio for conversion.
    pub async fn send_audio(&mut self, pcm16: Vec<u8>) -> Result<()> {
        let session = Arc::clone(&self.session);
        let transport = self.ensure_connected().await?;
        session.mark_sent();
        transport.send_binary(pcm16).await
    }

    /// Sends a whole-text request to a one-shot synthesis stage.
    ///
    /// The stage answers with the complete utterance and closes, so there is
    /// no separate `end` and every request opens a fresh connection.
    pub async fn send_request(&mut self, request: &SynthesisRequest) -> Result<()> {
        self.teardown().await;
        let session = Arc::clone(&self.session);
        let transport = self.ensure_connected().await?;
        session.mark_sent();
        transport.send_request(request).await?;
        debug!(stage = self.name, chars = request.text.chars().count(), "request sent");
        Ok(())
    }

    /// Tells the stage no more input follows for this utterance.
    ///
    /// Arms the session first: a turn that sent nothing still drains on the
    /// peer's `end` reply.
    pub async fn end(&mut self) -> Result<()> {
        let session = Arc::clone(&self.session);
        let transport = self.ensure_connected().await?;
        session.mark_sent();
        transport.send_message(&ClientMessage::End).await?;
        debug!(stage = self.name, "end sent");
        Ok(())
    }

    /// Closes the connection; the next send reconnects.
    pub async fn close(&mut self) {
        self.teardown().await;
    }

    /// Stops the old pump before its connection goes away so a stale
    /// disconnect can never reach the session.
    async fn teardown(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
            if let Err(e) = pump.await
                && !e.is_cancelled()
            {
                debug!(stage = self.name, error = %e, "pump task failed");
            }
        }
        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }
    }
}

impl std::fmt::Debug for StageLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageLink")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("speaker", &self.speaker)
            .field("connected", &self.is_connected())
            .finish()
    }
}
