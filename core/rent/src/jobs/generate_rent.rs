use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use core_tenant::TenantDirectory;
use job::*;

use crate::{CoreRent, store::RentLedgerStore};

#[derive(Clone, Serialize, Deserialize)]
pub struct GenerateRentJobConfig<S, D> {
    pub _phantom: std::marker::PhantomData<(S, D)>,
}

impl<S, D> GenerateRentJobConfig<S, D> {
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<S, D> Default for GenerateRentJobConfig<S, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, D> JobConfig for GenerateRentJobConfig<S, D>
where
    S: RentLedgerStore,
    D: TenantDirectory,
{
    type Initializer = GenerateRentInit<S, D>;
}

pub struct GenerateRentInit<S, D> {
    rent: CoreRent<S, D>,
}

impl<S, D> GenerateRentInit<S, D>
where
    S: RentLedgerStore,
    D: TenantDirectory,
{
    pub fn new(rent: &CoreRent<S, D>) -> Self {
        Self { rent: rent.clone() }
    }
}

const GENERATE_RENT_JOB: JobType = JobType::new("cron.generate-monthly-rent");

impl<S, D> JobInitializer for GenerateRentInit<S, D>
where
    S: RentLedgerStore,
    D: TenantDirectory,
{
    fn job_type() -> JobType
    where
        Self: Sized,
    {
        GENERATE_RENT_JOB
    }

    fn init(&self, _: &Job) -> Result<Box<dyn JobRunner>, Box<dyn std::error::Error>> {
        Ok(Box::new(GenerateRentJobRunner {
            rent: self.rent.clone(),
        }))
    }

    fn retry_on_error_settings() -> RetrySettings
    where
        Self: Sized,
    {
        RetrySettings::repeat_indefinitely()
    }
}

pub struct GenerateRentJobRunner<S, D> {
    rent: CoreRent<S, D>,
}

#[async_trait]
impl<S, D> JobRunner for GenerateRentJobRunner<S, D>
where
    S: RentLedgerStore,
    D: TenantDirectory,
{
    #[instrument(name = "rent.job.generate-monthly-rent", skip(self, _current_job))]
    async fn run(
        &self,
        _current_job: CurrentJob,
    ) -> Result<JobCompletion, Box<dyn std::error::Error>> {
        self.rent.generate_monthly_rent().await?;

        let config = self.rent.config();
        Ok(JobCompletion::RescheduleAt(
            config
                .generation_run_time
                .next_after(crate::time::now(), config.billing_offset()),
        ))
    }
}
