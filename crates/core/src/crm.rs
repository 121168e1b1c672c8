//! Deterministic campaign planning over reservation history: upcoming
//! birthdays and customers who have gone quiet. Planning only — message
//! delivery belongs to an outer layer.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::{Customer, CustomerId};

/// One completed visit, as read from reservation rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub customer_id: CustomerId,
    pub at: DateTime<Utc>,
    pub total_ticket: Decimal,
}

#[derive(Clone, Copy, Debug)]
pub struct CampaignConfig {
    pub birthday_days_ahead: i64,
    pub inactivity_days: i64,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self { birthday_days_ahead: 7, inactivity_days: 30 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignKind {
    Birthday { days_until: i64 },
    WinBack { days_since_last: i64 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub customer_id: CustomerId,
    pub name: String,
    pub email: Option<String>,
    pub kind: CampaignKind,
    pub suggested_discount_pct: u8,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomerOverview {
    pub customer_id: CustomerId,
    pub name: String,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub visits_count: usize,
    pub last_visit: Option<DateTime<Utc>>,
    pub average_ticket: Decimal,
}

#[derive(Clone, Debug, Default)]
pub struct CampaignPlanner {
    config: CampaignConfig,
}

impl CampaignPlanner {
    pub fn new(config: CampaignConfig) -> Self {
        Self { config }
    }

    /// Mean ticket per customer over their recorded visits.
    pub fn average_ticket(visits: &[VisitRecord]) -> HashMap<CustomerId, Decimal> {
        let mut totals: HashMap<CustomerId, (Decimal, u32)> = HashMap::new();
        for visit in visits {
            let entry = totals.entry(visit.customer_id.clone()).or_insert((Decimal::ZERO, 0));
            entry.0 += visit.total_ticket;
            entry.1 += 1;
        }

        totals
            .into_iter()
            .map(|(customer_id, (sum, count))| (customer_id, sum / Decimal::from(count)))
            .collect()
    }

    /// Higher spenders get the bigger birthday discount.
    pub fn suggested_discount(average_ticket: Decimal) -> u8 {
        if average_ticket >= Decimal::from(300) {
            20
        } else if average_ticket >= Decimal::from(150) {
            15
        } else {
            10
        }
    }

    fn days_until_birthday(birth_date: NaiveDate, today: NaiveDate) -> Option<i64> {
        // Feb 29 birthdays celebrate on Mar 1 in common years.
        let next = NaiveDate::from_ymd_opt(today.year(), birth_date.month(), birth_date.day())
            .or_else(|| NaiveDate::from_ymd_opt(today.year(), 3, 1))?;
        let next = if next < today {
            NaiveDate::from_ymd_opt(today.year() + 1, birth_date.month(), birth_date.day())
                .or_else(|| NaiveDate::from_ymd_opt(today.year() + 1, 3, 1))?
        } else {
            next
        };
        Some((next - today).num_days())
    }

    pub fn prepare_birthday_campaigns(
        &self,
        customers: &[Customer],
        visits: &[VisitRecord],
        today: NaiveDate,
    ) -> Vec<Campaign> {
        let spend = Self::average_ticket(visits);

        let mut campaigns = Vec::new();
        for customer in customers {
            let Some(birth_date) = customer.birth_date else {
                continue;
            };
            let Some(days_until) = Self::days_until_birthday(birth_date, today) else {
                continue;
            };
            if days_until > self.config.birthday_days_ahead {
                continue;
            }

            let average = spend.get(&customer.id).copied().unwrap_or(Decimal::ZERO);
            let discount = Self::suggested_discount(average);
            let name = customer.display_name();
            campaigns.push(Campaign {
                customer_id: customer.id.clone(),
                name: name.clone(),
                email: customer.email.clone(),
                kind: CampaignKind::Birthday { days_until },
                suggested_discount_pct: discount,
                message: format!(
                    "Hola {name}, tu cumpleaños está en {days_until} días. \
                     ¡Te ofrecemos un {discount}% de descuento en tu próxima visita!"
                ),
            });
        }

        campaigns
    }

    pub fn prepare_winback_campaigns(
        &self,
        customers: &[Customer],
        visits: &[VisitRecord],
        now: DateTime<Utc>,
    ) -> Vec<Campaign> {
        let mut last_visit: HashMap<&CustomerId, DateTime<Utc>> = HashMap::new();
        for visit in visits {
            last_visit
                .entry(&visit.customer_id)
                .and_modify(|at| *at = (*at).max(visit.at))
                .or_insert(visit.at);
        }

        let mut campaigns = Vec::new();
        for customer in customers {
            // Customers with no visit on record count as inactive.
            let days_since_last = last_visit
                .get(&customer.id)
                .map(|at| (now - *at).num_days())
                .unwrap_or(self.config.inactivity_days + 1);
            if days_since_last <= self.config.inactivity_days {
                continue;
            }

            let name = customer.display_name();
            campaigns.push(Campaign {
                customer_id: customer.id.clone(),
                name: name.clone(),
                email: customer.email.clone(),
                kind: CampaignKind::WinBack { days_since_last },
                suggested_discount_pct: 15,
                message: format!(
                    "Hola {name}, hace {days_since_last} días que no te vemos. \
                     ¡Te ofrecemos un 15% de descuento si reservas esta semana!"
                ),
            });
        }

        campaigns
    }

    /// Aggregate view per customer, most frequent visitors first.
    pub fn customer_overview(
        customers: &[Customer],
        visits: &[VisitRecord],
        limit: usize,
    ) -> Vec<CustomerOverview> {
        let spend = Self::average_ticket(visits);

        let mut overview: Vec<CustomerOverview> = customers
            .iter()
            .map(|customer| {
                let own_visits: Vec<&VisitRecord> =
                    visits.iter().filter(|v| v.customer_id == customer.id).collect();
                CustomerOverview {
                    customer_id: customer.id.clone(),
                    name: customer.display_name(),
                    email: customer.email.clone(),
                    whatsapp: customer.whatsapp.clone(),
                    birth_date: customer.birth_date,
                    visits_count: own_visits.len(),
                    last_visit: own_visits.iter().map(|v| v.at).max(),
                    average_ticket: spend.get(&customer.id).copied().unwrap_or(Decimal::ZERO),
                }
            })
            .collect();

        overview.sort_by(|a, b| {
            b.visits_count.cmp(&a.visits_count).then(b.last_visit.cmp(&a.last_visit))
        });
        if limit > 0 {
            overview.truncate(limit);
        }
        overview
    }
}
