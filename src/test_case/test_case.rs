//! Test-case orchestration.
//!
//! A test case owns one generator bundle, one recorder bundle and one
//! comparator. `run` drives the GP pass, the PUT pass and the
//! comparison in order; `unrun` is the defensive teardown used after a
//! failed run.

use std::path::Path;
use std::sync::Arc;

use log::{error, info};

use crate::comparator::types::ComparatorEntry;
use crate::comparator::Comparator;
use crate::configuration::types::{CaseConfig, TargetLabel, TestSetup};
use crate::dispatch::ServiceBundle;
use crate::error_handling::types::{ConfigError, TestCaseError};
use crate::generator::Generator;
use crate::packet_model::live::SessionFactory;
use crate::recorder::Recorder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestCaseState {
    Idle,
    RunningGp,
    RunningPut,
    Comparing,
}

pub struct TestCase {
    name: String,
    generators: ServiceBundle<Generator>,
    recorders: ServiceBundle<Recorder>,
    comparator: Comparator,
    state: TestCaseState,
}

impl TestCase {
    pub fn new(
        name: &str,
        generators: ServiceBundle<Generator>,
        recorders: ServiceBundle<Recorder>,
        comparator: Comparator,
    ) -> Self {
        Self {
            name: name.to_string(),
            generators,
            recorders,
            comparator,
            state: TestCaseState::Idle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TestCaseState {
        self.state
    }

    /// Runs the full capture-generate-compare sequence: first against
    /// the golden platform, then against the platform under test, then
    /// the comparison of both capture sets.
    pub async fn run(&mut self) -> Result<(), TestCaseError> {
        info!("Starting {} case against Golden Platform.", self.name);
        self.state = TestCaseState::RunningGp;
        self.recorders.start(TargetLabel::Gp).await?;
        self.generators.start(TargetLabel::Gp).await?;
        self.recorders.stop(TargetLabel::Gp).await?;

        info!("Starting {} case against Platform Under Test.", self.name);
        self.state = TestCaseState::RunningPut;
        self.recorders.start(TargetLabel::Put).await?;
        self.generators.start(TargetLabel::Put).await?;
        self.recorders.stop(TargetLabel::Put).await?;

        info!("Setting up comparator configuration");
        self.state = TestCaseState::Comparing;
        self.comparator.setup(&self.recorders)?;
        self.comparator.start()?;

        self.state = TestCaseState::Idle;
        Ok(())
    }

    /// Defensive teardown: stops every service for both targets,
    /// logging failures instead of propagating them. Safe to call on a
    /// case that never ran or only partially ran.
    pub async fn unrun(&mut self) {
        info!("Stopping {} case against Golden Platform.", self.name);
        if let Err(e) = self.generators.stop(TargetLabel::Gp).await {
            error!("{}", e);
        }
        if let Err(e) = self.recorders.stop(TargetLabel::Gp).await {
            error!("{}", e);
        }

        info!("Stopping {} case against Platform Under Test.", self.name);
        if let Err(e) = self.generators.stop(TargetLabel::Put).await {
            error!("{}", e);
        }
        if let Err(e) = self.recorders.stop(TargetLabel::Put).await {
            error!("{}", e);
        }

        self.comparator.stop();
        self.state = TestCaseState::Idle;
    }
}

/// Wires up one test case from the parsed setup: a generator and a
/// recorder per target plus a comparator with the given entries and the
/// case's timing ranges.
pub fn assemble_case(
    setup: &TestSetup,
    case: &CaseConfig,
    dump_root: &Path,
    factory: Arc<dyn SessionFactory>,
    entries: Vec<ComparatorEntry>,
) -> Result<TestCase, ConfigError> {
    let mut generators: ServiceBundle<Generator> = ServiceBundle::new("generator");
    let mut recorders: ServiceBundle<Recorder> = ServiceBundle::new("recorder");
    for target in TargetLabel::ALL {
        generators.bind(target, Generator::new(target, setup.generator_config(target, case)?));
        recorders.bind(
            target,
            Recorder::new(
                target,
                setup.recorder_config(target, case, dump_root)?,
                Arc::clone(&factory),
            ),
        );
    }
    let comparator = Comparator::new(entries, case.timing_gp(), case.timing_put());
    Ok(TestCase::new(&case.name, generators, recorders, comparator))
}
