//! Patient/clinician existence checks.

use crate::model::{ClinicianId, PatientId};
use std::collections::HashSet;

/// Answers whether an identity reference exists.
pub trait IdentityDirectory: Send + Sync {
    fn patient_exists(&self, id: PatientId) -> bool;
    fn clinician_exists(&self, id: ClinicianId) -> bool;
}

/// Fixed identity set for embedding hosts and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    patients: HashSet<PatientId>,
    clinicians: HashSet<ClinicianId>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patient(mut self, id: PatientId) -> Self {
        self.patients.insert(id);
        self
    }

    pub fn with_clinician(mut self, id: ClinicianId) -> Self {
        self.clinicians.insert(id);
        self
    }
}

impl IdentityDirectory for InMemoryDirectory {
    fn patient_exists(&self, id: PatientId) -> bool {
        self.patients.contains(&id)
    }

    fn clinician_exists(&self, id: ClinicianId) -> bool {
        self.clinicians.contains(&id)
    }
}
