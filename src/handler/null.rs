//! The null handler: discards everything. Useful as a baseline in
//! benchmarks, since records still travel the full transport path.

use crate::{error::Result, filter::FilterSet, handler::Handler, record::Record};

pub struct NullHandler {
    name: String,
    filters: FilterSet,
}

impl NullHandler {
    pub fn new(name: impl Into<String>, filters: FilterSet) -> NullHandler {
        NullHandler {
            name: name.into(),
            filters,
        }
    }
}

impl Handler for NullHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn filters(&self) -> &FilterSet {
        &self.filters
    }

    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn process_log(&mut self, _record: &Record) -> Result<()> {
        Ok(())
    }

    fn process_exit(&mut self) -> Result<()> {
        Ok(())
    }

    fn process_cfg(&mut self, filters: FilterSet) -> Result<()> {
        self.filters = filters;
        Ok(())
    }
}
