//! Payment receipts
//!
//! Renders the fixed-layout receipt sent after a successful card payment as a
//! self-contained HTML document. Rendering is pure: the same input always
//! produces the same bytes.

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

/// Static company details printed on every receipt
#[derive(Debug, Clone, Copy)]
pub struct CompanyInfo {
    pub name: &'static str,
    pub legal_name: &'static str,
    pub company_number: &'static str,
    pub address: &'static str,
    pub website: &'static str,
    pub email: &'static str,
}

pub const COMPANY: CompanyInfo = CompanyInfo {
    name: "Nerbixa",
    legal_name: "GUΑRΑΝТЕЕD GRЕΑТ SЕRVIСЕ LТD",
    company_number: "15982295",
    address: "Dept 6162 43 Owston Road, Carcroft, Doncaster, United Kingdom, DN6 8DA",
    website: "nerbixa.com",
    email: "support@nerbixa.com",
};

/// Everything a receipt shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptData {
    pub receipt_id: String,
    pub email: String,
    /// Already formatted for display
    pub date: String,
    /// Credits bought
    pub tokens: i32,
    pub description: String,
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
}

impl ReceiptData {
    pub fn file_name(&self) -> String {
        format!("receipt-{}.html", self.receipt_id)
    }

    pub fn subject(&self) -> String {
        format!("Your {} receipt #{}", COMPANY.name, self.receipt_id)
    }
}

/// `1999, "USD"` renders as `19.99 USD`
pub fn format_amount(amount: i64, currency: &str) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02} {currency}", abs / 100, abs % 100)
}

/// Display date for a processor timestamp, falling back to `now` when the
/// processor did not send one. Unparseable timestamps are shown verbatim.
pub fn format_paid_date(paid_at: Option<&str>, now: OffsetDateTime) -> String {
    let format = format_description!("[month repr:long] [day padding:none], [year]");
    let moment = match paid_at {
        Some(raw) => match OffsetDateTime::parse(raw, &Rfc3339) {
            Ok(parsed) => parsed,
            Err(_) => return raw.to_string(),
        },
        None => now,
    };
    moment
        .format(&format)
        .unwrap_or_else(|_| moment.date().to_string())
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the receipt document
pub fn render_html(data: &ReceiptData) -> String {
    let total = escape(&format_amount(data.amount, &data.currency));
    let c = COMPANY;

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Receipt from {name}</title>
</head>
<body style="margin:0;padding:40px;background:#0f172a;font-family:Nunito,Arial,sans-serif;font-size:12px;color:#a1aac0;">
<div style="max-width:600px;margin:0 auto;">
  <div style="margin-top:48px;text-align:center;">
    <h1 style="font-size:24px;color:#ffffff;margin:0 0 4px;">Receipt from {name}</h1>
    <p style="font-size:15px;margin:0;padding-top:4px;">Receipt #{receipt_id}</p>
  </div>
  <div style="margin-top:32px;">
    <div style="font-size:10px;font-weight:700;color:#ffffff;text-transform:uppercase;">Client Email</div>
    <div style="font-size:15px;padding-top:6px;">{email}</div>
  </div>
  <table style="width:100%;margin-top:32px;border-collapse:collapse;">
    <tr>
      <td style="width:33%;vertical-align:top;">
        <div style="font-size:10px;font-weight:700;color:#ffffff;text-transform:uppercase;">Amount paid</div>
        <div style="font-size:15px;padding-top:6px;">{total}</div>
      </td>
      <td style="width:33%;vertical-align:top;">
        <div style="font-size:10px;font-weight:700;color:#ffffff;text-transform:uppercase;">Date paid</div>
        <div style="font-size:15px;padding-top:6px;">{date}</div>
      </td>
      <td style="width:33%;vertical-align:top;">
        <div style="font-size:10px;font-weight:700;color:#ffffff;text-transform:uppercase;">Payment method</div>
        <div style="font-size:15px;padding-top:6px;">Paid by Card</div>
      </td>
    </tr>
  </table>
  <div style="margin-top:32px;margin-bottom:12px;font-size:10px;font-weight:700;color:#ffffff;text-transform:uppercase;">Summary</div>
  <table style="width:100%;border-collapse:collapse;font-size:15px;">
    <tr style="border-bottom:1px solid #e6ebf1;">
      <td style="padding:8px 0;">{description}</td>
      <td style="padding:8px 0;text-align:right;">{total}</td>
    </tr>
    <tr>
      <td style="padding:8px 0;font-weight:bold;">Amount paid</td>
      <td style="padding:8px 0;text-align:right;font-weight:bold;">{total}</td>
    </tr>
  </table>
  <p style="margin-top:40px;font-size:16px;line-height:1.5;">If you have any questions contact us at <a href="mailto:{email_company}" style="color:#625afa;font-weight:bold;text-decoration:none;">{email_company}</a>.</p>
  <p style="margin-top:20px;font-size:12px;line-height:1.4;">You&#39;re receiving this email because you made a purchase at {name}.</p>
  <p style="text-align:center;">{name} | {legal_name} | {company_number}<br>{address}<br>Website: <a href="https://{website}" style="color:#625afa;font-weight:bold;text-decoration:none;">{website}</a> | Email: <a href="mailto:{email_company}" style="color:#625afa;font-weight:bold;text-decoration:none;">{email_company}</a></p>
</div>
</body>
</html>
"#,
        name = c.name,
        receipt_id = escape(&data.receipt_id),
        email = escape(&data.email),
        total = total,
        date = escape(&data.date),
        description = escape(&data.description),
        email_company = c.email,
        legal_name = c.legal_name,
        company_number = c.company_number,
        address = c.address,
        website = c.website,
    )
}
