use crate::config::SqsConfig;

/// Segment appended to the base name to form the dead-letter queue name.
pub const DEAD_LETTER_SEGMENT: &str = "-exceptions";

/// Main and dead-letter queue names derived from one logical queue name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    pub main: String,
    pub dead_letter: String,
}

impl QueueNames {
    pub fn from_config(config: &SqsConfig) -> Self {
        QueueNames::derive(&config.queue_name, config.is_fifo, &config.fifo_suffix)
    }

    /// Derives both names. For ordered queues the suffix is moved behind the
    /// dead-letter segment, so `orders.fifo` pairs with `orders-exceptions.fifo`.
    pub fn derive(base_name: &str, is_fifo: bool, fifo_suffix: &str) -> Self {
        if !is_fifo {
            return QueueNames {
                main: base_name.to_string(),
                dead_letter: format!("{base_name}{DEAD_LETTER_SEGMENT}"),
            };
        }

        let stem = strip_ordered_suffix(base_name, fifo_suffix);
        QueueNames {
            main: with_ordered_suffix(base_name, fifo_suffix),
            dead_letter: with_ordered_suffix(&format!("{stem}{DEAD_LETTER_SEGMENT}"), fifo_suffix),
        }
    }
}

/// Appends the ordered-queue suffix unless the name already carries it.
pub fn with_ordered_suffix(name: &str, fifo_suffix: &str) -> String {
    format!("{}{fifo_suffix}", strip_ordered_suffix(name, fifo_suffix))
}

/// Whether `name` carries the ordered-queue suffix.
pub fn is_ordered(name: &str, fifo_suffix: &str) -> bool {
    !fifo_suffix.is_empty() && strip_ordered_suffix(name, fifo_suffix).len() < name.len()
}

fn strip_ordered_suffix<'a>(name: &'a str, fifo_suffix: &str) -> &'a str {
    if fifo_suffix.is_empty() || name.len() < fifo_suffix.len() {
        return name;
    }
    let split = name.len() - fifo_suffix.len();
    match (name.get(..split), name.get(split..)) {
        (Some(stem), Some(tail)) if tail.eq_ignore_ascii_case(fifo_suffix) => stem,
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_queue_names() {
        let names = QueueNames::derive("orders", false, ".fifo");
        assert_eq!(names.main, "orders");
        assert_eq!(names.dead_letter, "orders-exceptions");
    }

    #[test]
    fn test_fifo_queue_names_from_bare_name() {
        let names = QueueNames::derive("orders", true, ".fifo");
        assert_eq!(names.main, "orders.fifo");
        assert_eq!(names.dead_letter, "orders-exceptions.fifo");
    }

    #[test]
    fn test_fifo_queue_names_from_suffixed_name() {
        let names = QueueNames::derive("orders.fifo", true, ".fifo");
        assert_eq!(names.main, "orders.fifo");
        assert_eq!(names.dead_letter, "orders-exceptions.fifo");
    }

    #[test]
    fn test_ordered_suffix_is_idempotent() {
        let once = with_ordered_suffix("orders", ".fifo");
        let twice = with_ordered_suffix(&once, ".fifo");
        assert_eq!(once, "orders.fifo");
        assert_eq!(twice, once);
        assert_eq!(with_ordered_suffix("orders.FIFO", ".fifo"), "orders.fifo");
    }

    #[test]
    fn test_is_ordered() {
        assert!(is_ordered("orders.fifo", ".fifo"));
        assert!(is_ordered("orders-exceptions.FIFO", ".fifo"));
        assert!(!is_ordered("orders", ".fifo"));
        assert!(!is_ordered("orders.fifo", ""));
    }

    #[test]
    fn test_multibyte_names_do_not_panic() {
        assert_eq!(with_ordered_suffix("ü", ".fifo"), "ü.fifo");
        assert_eq!(with_ordered_suffix("bestellungen-ü", ".fifo"), "bestellungen-ü.fifo");
    }

    #[test]
    fn test_from_config() {
        let config = SqsConfig {
            is_fifo: true,
            ..SqsConfig::new("payments")
        };
        let names = QueueNames::from_config(&config);
        assert_eq!(names.main, "payments.fifo");
        assert_eq!(names.dead_letter, "payments-exceptions.fifo");
    }
}
