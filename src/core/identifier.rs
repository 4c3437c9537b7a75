use snowflake::SnowflakeIdGenerator;

use std::cell::RefCell;


thread_local! {
    static GENERATOR: RefCell<SnowflakeIdGenerator> = RefCell::new(
        SnowflakeIdGenerator::new(1, 1)
    );
}

/// Correlation id stamped on each served request for log lines.
pub fn generate_request_id() -> i64 {
    GENERATOR.with(|generator| generator.borrow_mut().real_time_generate())
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::error::Error;

    #[test]
    fn test_ids_are_distinct() -> Result<(), Box<dyn Error>> {
        let first = generate_request_id();
        let second = generate_request_id();
        assert_ne!(first, second, "Consecutive ids must differ");
        Ok(())
    }
}
