pub use core_money::{KesCents, SignedKesCents};
pub use core_tenant::{BillingMonth, PaymentStatus, TenancyStatus, TenantId};

es_entity::entity_id! { RentRecordId, PaymentId }
