//! Read-only queries over persisted accounts.
//!
//! Nothing here recomputes: every answer is the snapshot written by the last
//! aggregation or refresh. Unknown customers come back as `Ok(None)`.

use crate::{
    core::{
        account::get_entries_for_account,
        context::LoyaltyContext,
        rules::{REDEMPTION_UNIT, Tier},
    },
    entities::{Account, account, account_entry},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{PaginatorTrait, QueryOrder, QuerySelect, prelude::*};
use serde::Serialize;
use tracing::{debug, instrument};

/// Largest page the listing will return.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Points and tier snapshot for one customer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointsSummary {
    /// Customer identity document
    pub customer_id: String,
    /// Latest known customer name
    pub display_name: String,
    /// Current tier
    pub tier: Tier,
    /// Points earned over the account's lifetime
    pub lifetime_points: i64,
    /// Points inside the current window
    pub active_points: i64,
    /// Active points rounded down to the redemption unit
    pub redeemable_points: i64,
    /// Currency value of the redeemable points
    pub redeemable_amount: f64,
}

impl TryFrom<&account::Model> for PointsSummary {
    type Error = Error;

    fn try_from(account: &account::Model) -> Result<Self> {
        Ok(Self {
            customer_id: account.customer_id.clone(),
            display_name: account.display_name.clone(),
            tier: account.tier.parse()?,
            lifetime_points: account.lifetime_points,
            active_points: account.active_points,
            redeemable_points: account.redeemable_points,
            redeemable_amount: account.redeemable_amount,
        })
    }
}

/// One page of customers ready to redeem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedemptionPage {
    /// Customers on this page, most active points first
    pub items: Vec<PointsSummary>,
    /// Number of eligible customers across all pages
    pub total: u64,
    /// 1-based page number served
    pub page: u64,
    /// Page size after clamping
    pub page_size: u64,
}

/// An account together with its full history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountDetail {
    /// The persisted account
    pub account: account::Model,
    /// Parsed tier of the account
    pub tier: Tier,
    /// History entries, oldest first
    pub entries: Vec<account_entry::Model>,
}

/// Customer record in the shape older consumers read: derived fields, no history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerRecord {
    /// Customer identity document
    pub customer_id: String,
    /// Latest known customer name
    pub name: String,
    /// Latest known phone number
    pub phone: Option<String>,
    /// Latest known email address
    pub email: Option<String>,
    /// Window anchor
    pub subscription_date: DateTime<Utc>,
    /// Current tier
    pub tier: Tier,
    /// Sum of all purchase amounts
    pub total_spent: f64,
    /// Number of purchases
    pub total_purchases: i64,
    /// Points earned over the account's lifetime
    pub total_points: i64,
    /// Points inside the current window
    pub active_points: i64,
    /// Active points rounded down to the redemption unit
    pub redeemable_points: i64,
    /// Currency value of the redeemable points
    pub redeemable_amount: f64,
    /// When the derived fields were last recomputed
    pub last_updated: DateTime<Utc>,
}

impl TryFrom<&account::Model> for CustomerRecord {
    type Error = Error;

    fn try_from(account: &account::Model) -> Result<Self> {
        Ok(Self {
            customer_id: account.customer_id.clone(),
            name: account.display_name.clone(),
            phone: account.phone.clone(),
            email: account.email.clone(),
            subscription_date: account.subscription_date,
            tier: account.tier.parse()?,
            total_spent: account.lifetime_spend,
            total_purchases: account.lifetime_purchases,
            total_points: account.lifetime_points,
            active_points: account.active_points,
            redeemable_points: account.redeemable_points,
            redeemable_amount: account.redeemable_amount,
            last_updated: account.last_updated,
        })
    }
}

/// Bounds a requested page size to `1..=MAX_PAGE_SIZE`.
#[must_use]
pub fn clamp_page_size(requested: u64) -> u64 {
    requested.clamp(1, MAX_PAGE_SIZE)
}

async fn find_account(ctx: &LoyaltyContext, customer_id: &str) -> Result<Option<account::Model>> {
    Account::find_by_id(customer_id.to_string())
        .one(&ctx.database)
        .await
        .map_err(Into::into)
}

/// Returns the points snapshot for a customer, or `None` if there is no such account.
#[instrument(skip(ctx))]
pub async fn get_points(ctx: &LoyaltyContext, customer_id: &str) -> Result<Option<PointsSummary>> {
    find_account(ctx, customer_id)
        .await?
        .as_ref()
        .map(PointsSummary::try_from)
        .transpose()
}

/// Lists customers with at least one redemption unit of active points.
///
/// Ordered by active points descending, then customer id ascending so equal
/// balances paginate deterministically. `page` is 1-based; `page_size` falls
/// back to the configured default and is clamped to `1..=MAX_PAGE_SIZE`.
#[instrument(skip(ctx))]
pub async fn list_ready_for_redemption(
    ctx: &LoyaltyContext,
    page: u64,
    page_size: Option<u64>,
) -> Result<RedemptionPage> {
    if page == 0 {
        return Err(Error::InvalidPage { page });
    }
    let page_size = clamp_page_size(page_size.unwrap_or(ctx.listing.default_page_size));

    let eligible = Account::find().filter(account::Column::ActivePoints.gte(REDEMPTION_UNIT));
    let total = eligible.clone().count(&ctx.database).await?;

    // Offsets past i64 cannot be bound; such pages are necessarily empty
    let offset = (page - 1)
        .checked_mul(page_size)
        .filter(|offset| i64::try_from(*offset).is_ok());
    let accounts = match offset {
        Some(offset) => {
            eligible
                .order_by_desc(account::Column::ActivePoints)
                .order_by_asc(account::Column::CustomerId)
                .offset(offset)
                .limit(page_size)
                .all(&ctx.database)
                .await?
        }
        None => Vec::new(),
    };

    let items = accounts
        .iter()
        .map(PointsSummary::try_from)
        .collect::<Result<Vec<_>>>()?;

    debug!(
        "Redemption listing page {} (size {}): {} of {} eligible customers",
        page,
        page_size,
        items.len(),
        total
    );

    Ok(RedemptionPage {
        items,
        total,
        page,
        page_size,
    })
}

/// Returns an account with its full history, or `None` if there is no such account.
#[instrument(skip(ctx))]
pub async fn get_account(ctx: &LoyaltyContext, customer_id: &str) -> Result<Option<AccountDetail>> {
    let Some(account) = find_account(ctx, customer_id).await? else {
        return Ok(None);
    };

    let entries = get_entries_for_account(&ctx.database, customer_id).await?;
    Ok(Some(AccountDetail {
        tier: account.tier.parse()?,
        account,
        entries,
    }))
}

/// Returns the history-free customer record, or `None` if there is no such account.
#[instrument(skip(ctx))]
pub async fn get_customer_record(
    ctx: &LoyaltyContext,
    customer_id: &str,
) -> Result<Option<CustomerRecord>> {
    find_account(ctx, customer_id)
        .await?
        .as_ref()
        .map(CustomerRecord::try_from)
        .transpose()
}
