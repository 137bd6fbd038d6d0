use chrono::NaiveDate;
use derive_builder::Builder;
#[cfg(feature = "json-schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use es_entity::*;

use crate::primitives::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(JsonSchema))]
pub struct UtilityCharges {
    #[serde(default)]
    pub water: KesCents,
    #[serde(default)]
    pub electricity: KesCents,
    #[serde(default)]
    pub garbage: KesCents,
    #[serde(default)]
    pub security: KesCents,
}

impl UtilityCharges {
    pub const ZERO: Self = Self {
        water: KesCents::ZERO,
        electricity: KesCents::ZERO,
        garbage: KesCents::ZERO,
        security: KesCents::ZERO,
    };

    pub fn total(&self) -> KesCents {
        self.water + self.electricity + self.garbage + self.security
    }
}

/// Partial utility update: provided line items replace the stored ones,
/// omitted ones are kept.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(JsonSchema))]
pub struct UtilityChargesUpdate {
    pub water: Option<KesCents>,
    pub electricity: Option<KesCents>,
    pub garbage: Option<KesCents>,
    pub security: Option<KesCents>,
}

impl UtilityChargesUpdate {
    pub fn merged_onto(&self, current: UtilityCharges) -> UtilityCharges {
        UtilityCharges {
            water: self.water.unwrap_or(current.water),
            electricity: self.electricity.unwrap_or(current.electricity),
            garbage: self.garbage.unwrap_or(current.garbage),
            security: self.security.unwrap_or(current.security),
        }
    }
}

/// What a month's record passes on to its successor: at most one of the two
/// sides is ever positive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CarryForward {
    pub previous_balance: KesCents,
    pub credit_balance: KesCents,
}

#[derive(EsEvent, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[es_event(id = "RentRecordId")]
pub enum RentRecordEvent {
    Initialized {
        id: RentRecordId,
        tenant_id: TenantId,
        month: BillingMonth,
        base_rent: KesCents,
        previous_balance: KesCents,
        credit_balance: KesCents,
        due_date: NaiveDate,
    },
    UtilityChargesUpdated {
        charges: UtilityCharges,
    },
    PaymentApplied {
        payment_id: PaymentId,
        amount: KesCents,
        reference: Option<String>,
        effective: NaiveDate,
    },
}

#[derive(EsEntity, Builder)]
#[builder(pattern = "owned", build_fn(error = "EsEntityError"))]
pub struct RentRecord {
    pub id: RentRecordId,
    pub tenant_id: TenantId,
    pub month: BillingMonth,
    pub base_rent: KesCents,
    pub charges: UtilityCharges,
    /// Arrears inherited from the prior month.
    pub previous_balance: KesCents,
    /// Overpayment inherited from the prior month.
    pub credit_balance: KesCents,
    pub amount_paid: KesCents,
    pub due_date: NaiveDate,

    events: EntityEvents<RentRecordEvent>,
}

impl RentRecord {
    /// Base rent plus utility line items, before arrears and credit.
    pub fn amount(&self) -> KesCents {
        self.base_rent + self.charges.total()
    }

    /// The amount actually due this month. Clamped at zero: credit can
    /// cover the month entirely but never turns the due amount negative.
    pub fn carried_forward_amount(&self) -> KesCents {
        (self.amount() + self.previous_balance).saturating_sub(self.credit_balance)
    }

    /// Credit left over once this month is fully covered by it.
    fn unconsumed_credit(&self) -> KesCents {
        self.credit_balance
            .saturating_sub(self.amount() + self.previous_balance)
    }

    pub fn status(&self) -> PaymentStatus {
        if self.amount_paid >= self.carried_forward_amount() {
            PaymentStatus::Paid
        } else if self.amount_paid > KesCents::ZERO {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Pending
        }
    }

    pub fn status_as_of(&self, date: NaiveDate) -> PaymentStatus {
        let status = self.status();
        if status != PaymentStatus::Paid && date > self.due_date {
            PaymentStatus::Overdue
        } else {
            status
        }
    }

    /// Settle this month against what was paid and compute next month's
    /// inherited arrears or credit. Credit keeps compounding until
    /// exhausted: whatever this month could not consume rolls on together
    /// with any overpayment.
    pub fn carry_forward(&self) -> CarryForward {
        let carried = self.carried_forward_amount();
        CarryForward {
            previous_balance: carried.saturating_sub(self.amount_paid),
            credit_balance: self.amount_paid.saturating_sub(carried) + self.unconsumed_credit(),
        }
    }

    /// Persisted event count; doubles as the optimistic-concurrency version.
    pub fn version(&self) -> usize {
        self.events.iter_all().count()
    }

    pub fn events_snapshot(&self) -> Vec<RentRecordEvent> {
        self.events.iter_all().cloned().collect()
    }

    pub fn rehydrate(
        id: RentRecordId,
        events: Vec<RentRecordEvent>,
    ) -> Result<Self, EsEntityError> {
        Self::try_from_events(EntityEvents::init(id, events))
    }

    /// Cumulative payment application. Confirmations that arrive again with
    /// a reference already applied to this record are ignored.
    pub(crate) fn apply_payment(
        &mut self,
        payment_id: PaymentId,
        amount: KesCents,
        reference: Option<&str>,
        effective: NaiveDate,
    ) -> Idempotent<()> {
        if let Some(reference) = reference {
            idempotency_guard!(
                self.events.iter_all(),
                RentRecordEvent::PaymentApplied { reference: Some(applied), .. } if applied == reference
            );
        }
        self.amount_paid += amount;
        self.events.push(RentRecordEvent::PaymentApplied {
            payment_id,
            amount,
            reference: reference.map(String::from),
            effective,
        });
        Idempotent::Executed(())
    }

    pub(crate) fn update_charges(&mut self, charges: UtilityCharges) -> Idempotent<()> {
        if charges == self.charges {
            return Idempotent::Ignored;
        }
        self.charges = charges;
        self.events
            .push(RentRecordEvent::UtilityChargesUpdated { charges });
        Idempotent::Executed(())
    }
}

/// The due date falls on `due_day` of the billing month, or the next
/// month's occurrence when that day has already passed.
pub fn due_date_for(month: BillingMonth, today: NaiveDate, due_day: u32) -> NaiveDate {
    let due = month.day(due_day).expect("due day exists in every month");
    if today > due {
        month
            .next()
            .day(due_day)
            .expect("due day exists in every month")
    } else {
        due
    }
}

impl TryFromEvents<RentRecordEvent> for RentRecord {
    fn try_from_events(events: EntityEvents<RentRecordEvent>) -> Result<Self, EsEntityError> {
        let mut builder = RentRecordBuilder::default();
        let mut charges = UtilityCharges::ZERO;
        let mut amount_paid = KesCents::ZERO;

        for event in events.iter_all() {
            match event {
                RentRecordEvent::Initialized {
                    id,
                    tenant_id,
                    month,
                    base_rent,
                    previous_balance,
                    credit_balance,
                    due_date,
                } => {
                    builder = builder
                        .id(*id)
                        .tenant_id(*tenant_id)
                        .month(*month)
                        .base_rent(*base_rent)
                        .previous_balance(*previous_balance)
                        .credit_balance(*credit_balance)
                        .due_date(*due_date);
                }
                RentRecordEvent::UtilityChargesUpdated {
                    charges: new_charges,
                } => {
                    charges = *new_charges;
                }
                RentRecordEvent::PaymentApplied { amount, .. } => {
                    amount_paid += *amount;
                }
            }
        }

        builder
            .charges(charges)
            .amount_paid(amount_paid)
            .events(events)
            .build()
    }
}

#[derive(Debug, Builder)]
pub struct NewRentRecord {
    #[builder(setter(into))]
    pub(crate) id: RentRecordId,
    #[builder(setter(into))]
    pub(crate) tenant_id: TenantId,
    pub(crate) month: BillingMonth,
    pub(crate) base_rent: KesCents,
    #[builder(default)]
    pub(crate) previous_balance: KesCents,
    #[builder(default)]
    pub(crate) credit_balance: KesCents,
    pub(crate) due_date: NaiveDate,
}

impl NewRentRecord {
    pub fn builder() -> NewRentRecordBuilder {
        NewRentRecordBuilder::default()
    }
}

impl IntoEvents<RentRecordEvent> for NewRentRecord {
    fn into_events(self) -> EntityEvents<RentRecordEvent> {
        EntityEvents::init(
            self.id,
            [RentRecordEvent::Initialized {
                id: self.id,
                tenant_id: self.tenant_id,
                month: self.month,
                base_rent: self.base_rent,
                previous_balance: self.previous_balance,
                credit_balance: self.credit_balance,
                due_date: self.due_date,
            }],
        )
    }
}
