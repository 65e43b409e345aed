//! Receipt rendering route

use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use nerbixa_billing::{render_html, ReceiptData};

use crate::{
    error::{ApiError, ApiResult},
    extract::JsonBody,
};

/// POST /api/v1/receipts
pub async fn render_receipt(JsonBody(receipt): JsonBody<ReceiptData>) -> ApiResult<Response> {
    if receipt.receipt_id.trim().is_empty() {
        return Err(ApiError::Validation("receiptId is required".to_string()));
    }

    let file_name: String = receipt
        .file_name()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    let disposition = format!("inline; filename=\"{file_name}\"");
    let html = render_html(&receipt);

    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        html,
    )
        .into_response())
}
