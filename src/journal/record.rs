use getset::Getters;

/// One journal row, values in header order.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct TradeRecord {
    #[getset(get = "pub")]
    values: Vec<String>,
}

impl TradeRecord {
    pub fn new(values: Vec<String>) -> TradeRecord {
        TradeRecord { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: usize) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }
}
