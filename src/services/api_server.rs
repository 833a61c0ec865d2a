// src/services/api_server.rs
//! API Server for the ticket gate node
//!
//! This module provides the REST API used by the browser front-end and by
//! gate devices. It is built with Axum and includes endpoints for:
//! - Scanning QR credentials at the door and resetting the gate
//! - Issuing, inspecting and closing the holder's QR credential
//! - Browsing, creating and buying event tickets
//! - The holder's ticket list and refunds
//! - The organizer dashboard, revenue withdrawal and cancellation

use crate::blockchain::ledger::{ConfirmedTransaction, EventDirectory, LedgerError};
use crate::models::event::{EventDraft, EventListing, EventQuery, SortOrder};
use crate::services::credential_issuer::{CredentialIssuer, IssuedQr, IssuerError, IssuerState};
use crate::services::event_catalog::{CatalogError, EventCatalog, PurchaseAvailability};
use crate::services::organizer::{Dashboard, OrganizerDesk};
use crate::services::verifier::{Admission, Rejection, ScanOutcome, TicketVerifier, VerifierState};
use crate::utils::clock::Clock;
use crate::utils::format::{explorer_tx_link, format_eth, parse_event_date, shorten_address};
use crate::wallet::ticket_wallet::{request_refund, OwnedTicket, TicketTab, TicketWallet};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use ethers::types::{Address, TxHash};
use ethers::utils::parse_ether;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

// API request and response structures

/// Request payload for a gate scan
#[derive(Serialize, Deserialize)]
struct ScanRequest {
    /// Raw text decoded from the QR code
    payload: String,
}

/// Response for a gate scan
#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum ScanResponse {
    Admitted { admission: Admission, explorer_url: String },
    Rejected { rejection: Rejection },
    Cancelled,
    Ignored,
}

/// Request payload for issuing a QR credential
#[derive(Serialize, Deserialize)]
struct IssueQrRequest {
    event_address: String,
}

/// Response describing the issuer's display
#[derive(Serialize)]
struct QrStatusResponse {
    #[serde(flatten)]
    state: IssuerState,
    remaining_secs: u64,
}

/// Query string of the public event list
///
/// Prices are ether amounts and `from_date` is `YYYY-MM-DD`, as typed in
/// the filter form; empty values are ignored.
#[derive(Serialize, Deserialize, Default)]
struct BrowseParams {
    search: Option<String>,
    location: Option<String>,
    min_price: Option<String>,
    max_price: Option<String>,
    from_date: Option<String>,
    #[serde(default)]
    hide_sold_out: bool,
    #[serde(default)]
    sort: SortOrder,
}

/// Listing enriched with display fields
#[derive(Serialize)]
struct ListingView {
    #[serde(flatten)]
    listing: EventListing,
    price_eth: String,
    location_label: String,
    organizer_short: String,
    sold_out: bool,
}

impl From<EventListing> for ListingView {
    fn from(listing: EventListing) -> Self {
        ListingView {
            price_eth: format_eth(listing.price),
            location_label: listing.location_label(),
            organizer_short: shorten_address(&format!("{:?}", listing.organizer)),
            sold_out: listing.is_sold_out(),
            listing,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct AvailabilityParams {
    /// Defaults to the node wallet
    buyer: Option<String>,
}

#[derive(Serialize)]
struct AvailabilityResponse {
    buyer: Address,
    availability: PurchaseAvailability,
}

#[derive(Serialize, Deserialize)]
struct TicketsParams {
    #[serde(default)]
    tab: TicketTab,
}

#[derive(Serialize)]
struct TicketsResponse<'a> {
    holder: Address,
    tab: TicketTab,
    /// Tickets across both tabs
    total: usize,
    tickets: Vec<&'a OwnedTicket>,
}

/// Response for any confirmed write
#[derive(Serialize)]
struct TxResponse {
    tx_hash: TxHash,
    block_number: Option<u64>,
    explorer_url: String,
}

/// Error response with its HTTP status
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        ApiError { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    fn conflict(message: impl Into<String>) -> Self {
        ApiError { status: StatusCode::CONFLICT, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!("request failed: {}", self.message);
        } else {
            debug!("request refused ({}): {}", self.status, self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let status = match e {
            LedgerError::Declined => StatusCode::CONFLICT,
            _ => StatusCode::BAD_GATEWAY,
        };
        ApiError { status, message: e.to_string() }
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        let status = match e {
            CatalogError::Ledger(ledger) => return ApiError::from(ledger),
            CatalogError::UnknownEvent(_) => StatusCode::NOT_FOUND,
            CatalogError::Draft(_) => StatusCode::BAD_REQUEST,
            CatalogError::Unavailable(_)
            | CatalogError::RefundNotAvailable
            | CatalogError::WithdrawNotAvailable
            | CatalogError::CancelNotAvailable
            | CatalogError::NotOrganizer(_) => StatusCode::CONFLICT,
        };
        ApiError { status, message: e.to_string() }
    }
}

impl From<IssuerError> for ApiError {
    fn from(e: IssuerError) -> Self {
        let status = match e {
            IssuerError::SignatureDeclined | IssuerError::SigningInProgress | IssuerError::Closed => {
                StatusCode::CONFLICT
            }
            IssuerError::SigningFailed(_) => StatusCode::BAD_GATEWAY,
            IssuerError::Encoding(_) => StatusCode::BAD_REQUEST,
        };
        ApiError { status, message: e.to_string() }
    }
}

fn parse_address(text: &str) -> Result<Address, ApiError> {
    text.trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("`{}` is not an address", text)))
}

/// Treats blank form values as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl BrowseParams {
    fn into_query(self) -> Result<EventQuery, ApiError> {
        let price = |value: Option<String>| {
            non_blank(value)
                .map(|v| parse_ether(v.trim()).map_err(|_| ApiError::bad_request(format!("invalid price `{}`", v))))
                .transpose()
        };

        Ok(EventQuery {
            search: non_blank(self.search),
            location: non_blank(self.location),
            min_price: price(self.min_price)?,
            max_price: price(self.max_price)?,
            from_date: non_blank(self.from_date)
                .map(|d| parse_event_date(&d).map_err(|e| ApiError::bad_request(e.to_string())))
                .transpose()?,
            hide_sold_out: self.hide_sold_out,
            sort: self.sort,
        })
    }
}

/// API server state containing all service dependencies
pub struct ApiServer {
    /// Holder-side QR credential issuer
    issuer: Arc<CredentialIssuer>,

    /// Gate-side ticket verifier
    verifier: Arc<TicketVerifier>,

    /// Event discovery, purchase and creation
    catalog: Arc<EventCatalog>,

    /// Organizer dashboard and organizer writes
    desk: Arc<OrganizerDesk>,

    /// Ledger for ticket wallet reads and refunds
    directory: Arc<dyn EventDirectory>,

    clock: Arc<dyn Clock>,

    /// Base URL of the block explorer for transaction links
    block_explorer_url: String,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `issuer` - QR credential issuer signing with the node wallet
    /// * `verifier` - Ticket verifier for gate scans
    /// * `catalog` - Event catalog
    /// * `desk` - Organizer desk
    /// * `directory` - Ledger used for ticket lists and refunds
    /// * `clock` - Time source for ticket tabs
    /// * `block_explorer_url` - Explorer base for transaction links
    pub fn new(
        issuer: CredentialIssuer,
        verifier: TicketVerifier,
        catalog: EventCatalog,
        desk: OrganizerDesk,
        directory: Arc<dyn EventDirectory>,
        clock: Arc<dyn Clock>,
        block_explorer_url: String,
    ) -> Self {
        ApiServer {
            issuer: Arc::new(issuer),
            verifier: Arc::new(verifier),
            catalog: Arc::new(catalog),
            desk: Arc::new(desk),
            directory,
            clock,
            block_explorer_url,
        }
    }

    /// Builds the router with every API route and permissive CORS for the front-end
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(Self::health_handler))
            .route("/gate/scan", post(Self::scan_handler))
            .route("/gate/reset", post(Self::reset_handler))
            .route("/gate/status", get(Self::gate_status_handler))
            .route(
                "/qr",
                post(Self::issue_qr_handler)
                    .get(Self::qr_status_handler)
                    .delete(Self::close_qr_handler),
            )
            .route("/events", get(Self::browse_handler).post(Self::create_event_handler))
            .route("/events/:address", get(Self::event_handler))
            .route("/events/:address/availability", get(Self::availability_handler))
            .route("/events/:address/buy", post(Self::buy_handler))
            .route("/events/:address/refund", post(Self::refund_handler))
            .route("/events/:address/withdraw", post(Self::withdraw_handler))
            .route("/events/:address/cancel", post(Self::cancel_handler))
            .route("/tickets/:holder", get(Self::tickets_handler))
            .route("/organizers/:address/dashboard", get(Self::dashboard_handler))
            .with_state(Arc::new(self.clone())) // Share the entire ApiServer state
            .layer(CorsLayer::permissive())
    }

    /// Starts the API server and serves requests until the process stops
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    ///
    /// # Errors
    /// Returns the I/O error if the address cannot be bound or serving fails
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await
    }

    fn tx_response(&self, receipt: ConfirmedTransaction) -> TxResponse {
        TxResponse {
            explorer_url: explorer_tx_link(&self.block_explorer_url, receipt.tx_hash),
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
        }
    }

    async fn health_handler() -> impl IntoResponse {
        Json(json!({ "status": "ok" }))
    }

    // =====================
    // Gate Handlers
    // =====================

    /// Verifies a scanned QR credential and consumes the ticket
    ///
    /// # Endpoint
    /// POST /gate/scan
    ///
    /// # Responses
    /// - 200 OK: Admitted, rejected or cancelled by the operator
    /// - 409 Conflict: Another scan is in flight or the last result was not reset
    async fn scan_handler(
        State(state): State<Arc<ApiServer>>,
        Json(request): Json<ScanRequest>,
    ) -> Response {
        match state.verifier.scan(&request.payload).await {
            ScanOutcome::Admitted(admission) => {
                let explorer_url = explorer_tx_link(&state.block_explorer_url, admission.tx_hash);
                Json(ScanResponse::Admitted { admission, explorer_url }).into_response()
            }
            ScanOutcome::Rejected(rejection) => Json(ScanResponse::Rejected { rejection }).into_response(),
            ScanOutcome::Cancelled => Json(ScanResponse::Cancelled).into_response(),
            ScanOutcome::Ignored => (StatusCode::CONFLICT, Json(ScanResponse::Ignored)).into_response(),
        }
    }

    /// Clears the last scan result
    ///
    /// # Endpoint
    /// POST /gate/reset
    async fn reset_handler(State(state): State<Arc<ApiServer>>) -> Result<Json<VerifierState>, ApiError> {
        if !state.verifier.reset() {
            return Err(ApiError::conflict("a scan is in progress"));
        }
        Ok(Json(state.verifier.state()))
    }

    async fn gate_status_handler(State(state): State<Arc<ApiServer>>) -> Json<VerifierState> {
        Json(state.verifier.state())
    }

    // =====================
    // QR Credential Handlers
    // =====================

    /// Signs a fresh QR credential for an event with the node wallet
    ///
    /// # Endpoint
    /// POST /qr
    ///
    /// # Responses
    /// - 200 OK: Credential and QR payload
    /// - 400 Bad Request: `event_address` is not an address
    /// - 409 Conflict: Signing declined or already in progress
    async fn issue_qr_handler(
        State(state): State<Arc<ApiServer>>,
        Json(request): Json<IssueQrRequest>,
    ) -> Result<Json<IssuedQr>, ApiError> {
        parse_address(&request.event_address)?;
        let qr = state.issuer.issue(request.event_address.trim()).await?;
        Ok(Json(qr))
    }

    async fn qr_status_handler(State(state): State<Arc<ApiServer>>) -> Json<QrStatusResponse> {
        Json(QrStatusResponse {
            state: state.issuer.state(),
            remaining_secs: state.issuer.remaining_secs(),
        })
    }

    async fn close_qr_handler(State(state): State<Arc<ApiServer>>) -> StatusCode {
        state.issuer.close();
        StatusCode::NO_CONTENT
    }

    // =====================
    // Event Catalog Handlers
    // =====================

    /// Lists upcoming events matching the query string filters
    ///
    /// # Endpoint
    /// GET /events
    async fn browse_handler(
        State(state): State<Arc<ApiServer>>,
        Query(params): Query<BrowseParams>,
    ) -> Result<Json<Vec<ListingView>>, ApiError> {
        let query = params.into_query()?;
        let events = state.catalog.browse(&query).await?;
        Ok(Json(events.into_iter().map(ListingView::from).collect()))
    }

    /// Deploys a new event through the factory
    ///
    /// # Endpoint
    /// POST /events
    ///
    /// # Responses
    /// - 201 Created: Transaction receipt
    /// - 400 Bad Request: Draft failed validation
    async fn create_event_handler(
        State(state): State<Arc<ApiServer>>,
        Json(draft): Json<EventDraft>,
    ) -> Result<(StatusCode, Json<TxResponse>), ApiError> {
        let receipt = state.catalog.create_event(&draft).await?;
        Ok((StatusCode::CREATED, Json(state.tx_response(receipt))))
    }

    async fn event_handler(
        Path(address): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Result<Json<ListingView>, ApiError> {
        let listing = state.catalog.event(parse_address(&address)?).await?;
        Ok(Json(ListingView::from(listing)))
    }

    async fn availability_handler(
        Path(address): Path<String>,
        State(state): State<Arc<ApiServer>>,
        Query(params): Query<AvailabilityParams>,
    ) -> Result<Json<AvailabilityResponse>, ApiError> {
        let event = parse_address(&address)?;
        let buyer = match non_blank(params.buyer) {
            Some(buyer) => parse_address(&buyer)?,
            None => state.directory.operator(),
        };
        let availability = state.catalog.purchase_availability(event, buyer).await?;
        Ok(Json(AvailabilityResponse { buyer, availability }))
    }

    async fn buy_handler(
        Path(address): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Result<Json<TxResponse>, ApiError> {
        let receipt = state.catalog.buy_ticket(parse_address(&address)?).await?;
        Ok(Json(state.tx_response(receipt)))
    }

    // =====================
    // Ticket Wallet Handlers
    // =====================

    async fn refund_handler(
        Path(address): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Result<Json<TxResponse>, ApiError> {
        let receipt = request_refund(state.directory.as_ref(), parse_address(&address)?).await?;
        Ok(Json(state.tx_response(receipt)))
    }

    /// Lists a wallet's tickets in one tab
    ///
    /// # Endpoint
    /// GET /tickets/:holder?tab=active|past
    async fn tickets_handler(
        Path(holder): Path<String>,
        State(state): State<Arc<ApiServer>>,
        Query(params): Query<TicketsParams>,
    ) -> Result<Response, ApiError> {
        let holder = parse_address(&holder)?;
        let wallet = TicketWallet::load(state.directory.as_ref(), holder, state.clock.now_secs()).await?;
        let response = TicketsResponse {
            holder: wallet.holder(),
            tab: params.tab,
            total: wallet.count_tickets(),
            tickets: wallet.in_tab(params.tab),
        };
        Ok(Json(response).into_response())
    }

    // =====================
    // Organizer Handlers
    // =====================

    async fn dashboard_handler(
        Path(address): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Result<Json<Dashboard>, ApiError> {
        let dashboard = state.desk.dashboard(parse_address(&address)?).await?;
        Ok(Json(dashboard))
    }

    async fn withdraw_handler(
        Path(address): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Result<Json<TxResponse>, ApiError> {
        let receipt = state.desk.withdraw(parse_address(&address)?).await?;
        Ok(Json(state.tx_response(receipt)))
    }

    async fn cancel_handler(
        Path(address): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Result<Json<TxResponse>, ApiError> {
        let receipt = state.desk.cancel(parse_address(&address)?).await?;
        Ok(Json(state.tx_response(receipt)))
    }
}

// Implement Clone for ApiServer to use with Axum's State
impl Clone for ApiServer {
    fn clone(&self) -> Self {
        ApiServer {
            issuer: Arc::clone(&self.issuer),
            verifier: Arc::clone(&self.verifier),
            catalog: Arc::clone(&self.catalog),
            desk: Arc::clone(&self.desk),
            directory: Arc::clone(&self.directory),
            clock: Arc::clone(&self.clock),
            block_explorer_url: self.block_explorer_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::testing::MockLedger;
    use crate::models::event::fixtures::listing;
    use crate::services::credential_issuer::DEFAULT_REFRESH;
    use crate::services::verifier::{AutoApprove, DEFAULT_WINDOW_MS};
    use crate::utils::clock::ManualClock;
    use crate::wallet::key_management::{KeyManager, MessageSigner};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::FixedOffset;
    use serde_json::Value;
    use tower::ServiceExt;

    // 2025-01-01T00:00:00Z
    const NOW_MS: i64 = 1_735_689_600_000;

    struct Harness {
        router: Router,
        ledger: Arc<MockLedger>,
        holder: KeyManager,
    }

    fn harness() -> Harness {
        let ledger = Arc::new(MockLedger::default().with_event(listing(1)).with_event(listing(2)));
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at(NOW_MS));
        let holder = KeyManager::random();

        let server = ApiServer::new(
            CredentialIssuer::new(Arc::new(holder.clone()), clock.clone(), DEFAULT_REFRESH),
            TicketVerifier::new(ledger.clone(), Arc::new(AutoApprove), clock.clone(), DEFAULT_WINDOW_MS),
            EventCatalog::new(ledger.clone(), clock.clone(), FixedOffset::east_opt(0).unwrap()),
            OrganizerDesk::new(ledger.clone(), clock.clone()),
            ledger.clone(),
            clock,
            "https://sepolia.etherscan.io".to_string(),
        );

        Harness { router: server.router(), ledger, holder }
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = router.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn event_address(seed: u64) -> String {
        format!("{:?}", listing(seed).address)
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let (status, body) = call(&h.router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_issue_then_scan_admits_once() {
        let h = harness();
        let event = listing(1).address;
        h.ledger.grant_ticket(event, h.holder.address());

        let (status, qr) = call(&h.router, "POST", "/qr", Some(json!({ "event_address": event_address(1) }))).await;
        assert_eq!(status, StatusCode::OK);
        let payload = qr["payload"].as_str().unwrap().to_string();

        let (status, status_body) = call(&h.router, "GET", "/qr", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(status_body["state"], "displaying");
        assert_eq!(status_body["remaining_secs"], 30);

        let (status, scan) = call(&h.router, "POST", "/gate/scan", Some(json!({ "payload": payload }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(scan["outcome"], "admitted");
        assert_eq!(scan["admission"]["event_name"], "Concert 1");
        assert!(scan["explorer_url"].as_str().unwrap().starts_with("https://sepolia.etherscan.io/tx/0x"));

        // The result stays on screen until reset.
        let (status, _) = call(&h.router, "POST", "/gate/scan", Some(json!({ "payload": payload }))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, state) = call(&h.router, "POST", "/gate/reset", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state["state"], "idle");

        let (_, replay) = call(&h.router, "POST", "/gate/scan", Some(json!({ "payload": payload }))).await;
        assert_eq!(replay["outcome"], "rejected");
        assert_eq!(replay["rejection"]["code"], "already_used");
        assert_eq!(h.ledger.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_forged_scan_is_flagged() {
        let h = harness();
        let (_, qr) = call(&h.router, "POST", "/qr", Some(json!({ "event_address": event_address(1) }))).await;
        let mut credential = qr["credential"].clone();
        credential["usr"] = json!(format!("{:?}", Address::from_low_u64_be(7)));

        let (status, scan) = call(
            &h.router,
            "POST",
            "/gate/scan",
            Some(json!({ "payload": credential.to_string() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(scan["rejection"]["code"], "signature_mismatch");
        assert_eq!(scan["rejection"]["forgery"], true);
        assert_eq!(h.ledger.read_count(), 0);
    }

    #[tokio::test]
    async fn test_close_qr() {
        let h = harness();
        call(&h.router, "POST", "/qr", Some(json!({ "event_address": event_address(1) }))).await;

        let (status, _) = call(&h.router, "DELETE", "/qr", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = call(&h.router, "GET", "/qr", None).await;
        assert_eq!(body["state"], "idle");
        assert_eq!(body["remaining_secs"], 0);
    }

    #[tokio::test]
    async fn test_issue_qr_rejects_bad_address() {
        let h = harness();
        let (status, body) = call(&h.router, "POST", "/qr", Some(json!({ "event_address": "concert" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("concert"));
    }

    #[tokio::test]
    async fn test_browse_and_lookup() {
        let h = harness();

        let (status, events) = call(&h.router, "GET", "/events?sort=date_desc&max_price=0.05", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(events.as_array().unwrap().len(), 2);
        assert_eq!(events[0]["price_eth"], "0.05");
        assert_eq!(events[0]["location_label"], "Zorlu PSM, Istanbul");

        let (status, _) = call(&h.router, "GET", "/events?min_price=lots", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, event) = call(&h.router, "GET", &format!("/events/{}", event_address(2)), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(event["name"], "Concert 2");

        let (status, _) = call(&h.router, "GET", &format!("/events/{:?}", Address::from_low_u64_be(9)), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&h.router, "GET", "/events/not-an-address", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_buy_then_ticket_list() {
        let h = harness();
        let buy_uri = format!("/events/{}/buy", event_address(1));

        let (status, tx) = call(&h.router, "POST", &buy_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(tx["tx_hash"].is_string());

        let (status, body) = call(&h.router, "POST", &buy_uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already owned"));

        let operator = format!("{:?}", h.ledger.operator());
        let (status, tickets) = call(&h.router, "GET", &format!("/tickets/{}?tab=active", operator), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tickets["tickets"].as_array().unwrap().len(), 1);
        assert_eq!(tickets["total"], 1);
        assert_eq!(tickets["tickets"][0]["action"], "show_qr");

        let (_, availability) = call(
            &h.router,
            "GET",
            &format!("/events/{}/availability", event_address(1)),
            None,
        )
        .await;
        assert_eq!(availability["availability"], "already_owned");
    }

    #[tokio::test]
    async fn test_create_event_validation_error() {
        let h = harness();
        let draft = json!({
            "name": "Jazz Night",
            "date": "2024-06-01",
            "time": "20:30",
            "image_url": "https://img.example/jazz.png",
            "location_name": "Blue Note",
            "city": "Izmir",
            "country": "Turkey",
            "price": "0.01",
            "capacity": 50
        });

        let (status, body) = call(&h.router, "POST", "/events", Some(draft)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("future"));
        assert!(h.ledger.writes().is_empty());
    }

    #[tokio::test]
    async fn test_organizer_routes() {
        let h = harness();
        let operator = format!("{:?}", h.ledger.operator());

        let (status, dashboard) = call(&h.router, "GET", &format!("/organizers/{}/dashboard", operator), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dashboard["events"].as_array().unwrap().len(), 2);
        assert_eq!(dashboard["tickets_sold"], 20);

        let (status, _) = call(&h.router, "POST", &format!("/events/{}/withdraw", event_address(1)), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&h.router, "POST", &format!("/events/{}/cancel", event_address(1)), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&h.router, "POST", &format!("/events/{}/refund", event_address(1)), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
