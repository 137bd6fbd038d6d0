use chrono::NaiveDate;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use es_entity::*;

use crate::primitives::*;

#[derive(EsEvent, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[es_event(id = "TenantId")]
pub enum TenantEvent {
    Initialized {
        id: TenantId,
        name: String,
        phone: String,
        unit: String,
        monthly_rent: KesCents,
        lease_start: NaiveDate,
        lease_end: NaiveDate,
        status: TenancyStatus,
    },
    LeaseExtended {
        months: u32,
        new_lease_end: NaiveDate,
    },
    MonthlyRentPosted {
        month: BillingMonth,
        amount: KesCents,
    },
    PaymentApplied {
        month: BillingMonth,
        amount: KesCents,
        month_obligation: KesCents,
    },
    MarkedOverdue {
        month: BillingMonth,
    },
    StatusUpdated {
        status: TenancyStatus,
    },
}

#[derive(EsEntity, Builder)]
#[builder(pattern = "owned", build_fn(error = "EsEntityError"))]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub phone: String,
    pub unit: String,
    pub monthly_rent: KesCents,
    pub lease_start: NaiveDate,
    pub lease_end: NaiveDate,
    pub status: TenancyStatus,
    /// Running balance for `current_month`: positive = owed, negative = credit.
    pub balance: SignedKesCents,
    /// The billing period `balance` and `payment_status` currently reflect.
    pub current_month: Option<BillingMonth>,
    pub payment_status: PaymentStatus,

    events: EntityEvents<TenantEvent>,
}

impl Tenant {
    pub fn phone_suffix(&self) -> String {
        phone_suffix(&self.phone)
    }

    pub fn is_active(&self) -> bool {
        self.status == TenancyStatus::Active
    }

    /// Persisted event count; doubles as the optimistic-concurrency version.
    pub fn version(&self) -> usize {
        self.events.iter_all().count()
    }

    pub fn events_snapshot(&self) -> Vec<TenantEvent> {
        self.events.iter_all().cloned().collect()
    }

    pub fn rehydrate(id: TenantId, events: Vec<TenantEvent>) -> Result<Self, EsEntityError> {
        Self::try_from_events(EntityEvents::init(id, events))
    }

    pub(crate) fn post_monthly_rent(&mut self, month: BillingMonth) -> Idempotent<()> {
        idempotency_guard!(
            self.events.iter_all().rev(),
            TenantEvent::MonthlyRentPosted { month: posted, .. } if *posted == month
        );
        self.balance += self.monthly_rent;
        self.current_month = Some(month);
        self.payment_status = PaymentStatus::Pending;
        self.events.push(TenantEvent::MonthlyRentPosted {
            month,
            amount: self.monthly_rent,
        });
        Idempotent::Executed(())
    }

    /// Deduct a confirmed payment from the running balance. When the payment
    /// belongs to a month other than the one the balance reflects, the
    /// balance is rebuilt from that month's obligation first so a stale
    /// marker cannot corrupt it.
    pub(crate) fn apply_payment(
        &mut self,
        month: BillingMonth,
        amount: KesCents,
        month_obligation: KesCents,
    ) {
        if self.current_month == Some(month) {
            self.balance -= amount;
        } else {
            self.balance = SignedKesCents::from(month_obligation) - amount;
        }
        self.payment_status = payment_status_for(self.balance, self.monthly_rent);
        self.events.push(TenantEvent::PaymentApplied {
            month,
            amount,
            month_obligation,
        });
    }

    pub(crate) fn mark_overdue(&mut self, month: BillingMonth) -> Idempotent<()> {
        if self.payment_status == PaymentStatus::Paid {
            return Idempotent::Ignored;
        }
        idempotency_guard!(
            self.events.iter_all().rev(),
            TenantEvent::MarkedOverdue { month: marked } if *marked == month,
            => TenantEvent::MonthlyRentPosted { .. }
        );
        self.payment_status = PaymentStatus::Overdue;
        self.events.push(TenantEvent::MarkedOverdue { month });
        Idempotent::Executed(())
    }

    pub(crate) fn extend_lease(&mut self, months: u32) -> NaiveDate {
        let new_lease_end = self.lease_end + chrono::Months::new(months);
        self.lease_end = new_lease_end;
        self.events.push(TenantEvent::LeaseExtended {
            months,
            new_lease_end,
        });
        new_lease_end
    }

    pub(crate) fn update_status(&mut self, status: TenancyStatus) -> Idempotent<()> {
        if self.status == status {
            return Idempotent::Ignored;
        }
        self.status = status;
        self.events.push(TenantEvent::StatusUpdated { status });
        Idempotent::Executed(())
    }
}

fn payment_status_for(balance: SignedKesCents, monthly_rent: KesCents) -> PaymentStatus {
    if balance <= SignedKesCents::ZERO {
        PaymentStatus::Paid
    } else if balance < SignedKesCents::from(monthly_rent) {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Pending
    }
}

impl TryFromEvents<TenantEvent> for Tenant {
    fn try_from_events(events: EntityEvents<TenantEvent>) -> Result<Self, EsEntityError> {
        let mut builder = TenantBuilder::default();
        let mut monthly_rent = KesCents::ZERO;
        let mut balance = SignedKesCents::ZERO;
        let mut current_month = None;
        let mut payment_status = PaymentStatus::Pending;

        for event in events.iter_all() {
            match event {
                TenantEvent::Initialized {
                    id,
                    name,
                    phone,
                    unit,
                    monthly_rent: rent,
                    lease_start,
                    lease_end,
                    status,
                } => {
                    monthly_rent = *rent;
                    builder = builder
                        .id(*id)
                        .name(name.clone())
                        .phone(phone.clone())
                        .unit(unit.clone())
                        .monthly_rent(*rent)
                        .lease_start(*lease_start)
                        .lease_end(*lease_end)
                        .status(*status);
                }
                TenantEvent::LeaseExtended { new_lease_end, .. } => {
                    builder = builder.lease_end(*new_lease_end);
                }
                TenantEvent::MonthlyRentPosted { month, amount } => {
                    balance += *amount;
                    current_month = Some(*month);
                    payment_status = PaymentStatus::Pending;
                }
                TenantEvent::PaymentApplied {
                    month,
                    amount,
                    month_obligation,
                } => {
                    balance = if current_month == Some(*month) {
                        balance - *amount
                    } else {
                        SignedKesCents::from(*month_obligation) - *amount
                    };
                    payment_status = payment_status_for(balance, monthly_rent);
                }
                TenantEvent::MarkedOverdue { .. } => {
                    payment_status = PaymentStatus::Overdue;
                }
                TenantEvent::StatusUpdated { status } => {
                    builder = builder.status(*status);
                }
            }
        }

        builder
            .balance(balance)
            .current_month(current_month)
            .payment_status(payment_status)
            .events(events)
            .build()
    }
}

#[derive(Debug, Builder)]
pub struct NewTenant {
    #[builder(setter(into))]
    pub(crate) id: TenantId,
    #[builder(setter(into))]
    pub(crate) name: String,
    #[builder(setter(into))]
    pub(crate) phone: String,
    #[builder(setter(into))]
    pub(crate) unit: String,
    pub(crate) monthly_rent: KesCents,
    pub(crate) lease_start: NaiveDate,
    pub(crate) lease_end: NaiveDate,
    #[builder(default = "TenancyStatus::Active")]
    pub(crate) status: TenancyStatus,
}

impl NewTenant {
    pub fn builder() -> NewTenantBuilder {
        NewTenantBuilder::default()
    }
}

impl IntoEvents<TenantEvent> for NewTenant {
    fn into_events(self) -> EntityEvents<TenantEvent> {
        EntityEvents::init(
            self.id,
            [TenantEvent::Initialized {
                id: self.id,
                name: self.name,
                phone: self.phone,
                unit: self.unit,
                monthly_rent: self.monthly_rent,
                lease_start: self.lease_start,
                lease_end: self.lease_end,
                status: self.status,
            }],
        )
    }
}
