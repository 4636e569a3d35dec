use crate::model::TestResult;

/// The records of one dataset, built once and shared read-only with the
/// aggregator.
#[derive(Debug, Clone)]
pub struct TestResultRepository {
    dataset_id: String,
    results: Vec<TestResult>,
}

impl TestResultRepository {
    pub fn from_results(dataset_id: impl Into<String>, results: Vec<TestResult>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            results,
        }
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn invalid_count(&self) -> usize {
        self.results.iter().filter(|r| r.avg().is_invalid()).count()
    }
}
