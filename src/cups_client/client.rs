use std::collections::HashMap;
use std::time::Duration;

use ipp::error::IppError;
use ipp::prelude::*;
use log::debug;
use snafu::{ResultExt, Snafu};
use url::Url;

use crate::config::models::Cups;

use super::models::{CupsPrinter, CupsPrinterState};

pub fn build_cups_url(cups_settings: &Cups, queue_id: Option<&str>) -> Result<String, CupsError> {
    let mut cups_url = Url::parse(&cups_settings.uri).context(InvalidUrlSnafu { uri: &cups_settings.uri })?;
    if !cups_settings.username.is_empty() && !cups_settings.password.is_empty() {
        if cups_url.set_username(&cups_settings.username).is_err()
            || cups_url.set_password(Some(&cups_settings.password)).is_err()
        {
            return CredentialsSnafu { uri: &cups_settings.uri }.fail();
        }
    }

    if let Some(queue_id) = queue_id {
        // Pushed as one segment, so `#`, `?` and `/` in queue names are escaped.
        cups_url
            .path_segments_mut()
            .map_err(|_| NotABaseSnafu { uri: &cups_settings.uri }.build())?
            .pop_if_empty()
            .push("printers")
            .push(queue_id);
    }
    Ok(cups_url.to_string())
}

/// Async IPP client for the CUPS scheduler configured in [`Cups`].
#[derive(Debug, Clone)]
pub struct CupsClient {
    settings: Cups,
    uri: String,
}

impl CupsClient {
    pub fn new(cups_settings: &Cups) -> Result<Self, CupsError> {
        Ok(Self {
            settings: cups_settings.clone(),
            uri: build_cups_url(cups_settings, None)?,
        })
    }

    /// Send an IPP request to do `op` to the given `uri` and get the response.
    ///
    /// The whole round trip is bounded by the configured timeout.
    async fn send_ipp_request(&self, uri: &str, op: Operation) -> Result<IppRequestResponse, CupsError> {
        let uri_p = uri
            .parse::<Uri>()
            .map_err(|e| InvalidUriSnafu { uri, reason: e.to_string() }.build())?;
        let req = IppRequestResponse::new(IppVersion::v1_1(), op, Some(uri_p.clone()));
        let client = AsyncIppClient::builder(uri_p)
            .ignore_tls_errors(self.settings.ignore_tls_errors)
            .build();

        match tokio::time::timeout(self.settings.timeout, client.send(req)).await {
            Ok(resp) => resp.context(RequestSnafu),
            Err(_) => TimeoutSnafu { timeout: self.settings.timeout }.fail(),
        }
    }

    /// Whether CUPS knows a queue with exactly this name.
    pub async fn has_printer(&self, queue_name: &str) -> Result<bool, CupsError> {
        let queue_uri = build_cups_url(&self.settings, Some(queue_name))?;
        let resp = self.send_ipp_request(&queue_uri, Operation::GetPrinterAttributes).await?;
        Ok(resp.header().status_code().is_success())
    }

    pub async fn get_printers(&self) -> Result<Vec<CupsPrinter>, CupsError> {
        let resp = self.send_ipp_request(&self.uri, Operation::CupsGetPrinters).await?;
        if !resp.header().status_code().is_success() {
            return StatusSnafu {
                operation: "CUPS-Get-Printers",
                status: format!("{:?}", resp.header().status_code()),
            }
            .fail();
        }

        let printers: Vec<CupsPrinter> = resp
            .attributes()
            .groups_of(DelimiterTag::PrinterAttributes)
            .filter_map(|group| printer_from_attributes(group.attributes()))
            .collect();
        debug!("CUPS reported {} print queue(s)", printers.len());
        Ok(printers)
    }

    /// Name of the server default destination, `None` when CUPS has none.
    pub async fn get_default_printer(&self) -> Result<Option<String>, CupsError> {
        let resp = self.send_ipp_request(&self.uri, Operation::CupsGetDefault).await?;
        // CUPS answers client-error-not-found when no default is set.
        if !resp.header().status_code().is_success() {
            return Ok(None);
        }

        let name = default_from_attributes(resp.attributes());
        Ok(name)
    }
}

fn default_from_attributes(attributes: &IppAttributes) -> Option<String> {
    attributes
        .groups_of(DelimiterTag::PrinterAttributes)
        .next()
        .and_then(|group| group.attributes().get("printer-name"))
        .map(|attr| attr.value().to_string())
        .filter(|name| !name.is_empty())
}

pub(crate) fn printer_from_attributes(attributes: &HashMap<String, IppAttribute>) -> Option<CupsPrinter> {
    let queue_name = attributes.get("printer-name")?.value().to_string();
    if queue_name.is_empty() {
        return None;
    }

    let state = match attributes.get("printer-state").map(|a| a.value()) {
        Some(IppValue::Enum(v)) | Some(IppValue::Integer(v)) => CupsPrinterState::from_ipp(*v),
        _ => CupsPrinterState::Unknown,
    };
    let accepting_jobs = match attributes.get("printer-is-accepting-jobs").map(|a| a.value()) {
        Some(IppValue::Boolean(b)) => Some(*b),
        _ => None,
    };
    let state_reasons = attributes
        .get("printer-state-reasons")
        .map(|a| value_strings(a.value()))
        .unwrap_or_default();

    Some(CupsPrinter { queue_name, state, state_reasons, accepting_jobs })
}

fn value_strings(value: &IppValue) -> Vec<String> {
    match value {
        IppValue::Array(items) => items.iter().map(|v| v.to_string()).collect(),
        other => vec![other.to_string()],
    }
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CupsError {
    #[snafu(display("Invalid CUPS URL '{uri}'"))]
    InvalidUrl { uri: String, source: url::ParseError },
    #[snafu(display("CUPS URL '{uri}' cannot have a queue path"))]
    NotABase { uri: String },
    #[snafu(display("CUPS URL '{uri}' cannot carry credentials"))]
    Credentials { uri: String },
    #[snafu(display("Invalid IPP URI '{uri}': {reason}"))]
    InvalidUri { uri: String, reason: String },
    #[snafu(display("IPP request failed"))]
    Request { source: IppError },
    #[snafu(display("CUPS did not answer within {}", humantime::format_duration(*timeout)))]
    Timeout { timeout: Duration },
    #[snafu(display("{operation} returned {status}"))]
    Status { operation: &'static str, status: String },
}
