//! Default product validation for large-media builds.

use super::traits::{ProductValidator, ValidationResult};
use crate::types::Product;

/// Cell names are eight characters: a two-character producer code and six alphanumerics
const CELL_NAME_LEN: usize = 8;

fn is_cell_name(name: &str) -> bool {
    name.len() == CELL_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Structural checks on cell names and update sequences
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicProductValidator;

impl BasicProductValidator {
    fn check(product: &Product) -> Option<String> {
        if !is_cell_name(&product.product_name) {
            return Some(format!(
                "{} is not a valid product name",
                product.product_name
            ));
        }
        if product
            .update_numbers
            .windows(2)
            .any(|pair| pair[1] < pair[0])
        {
            return Some(format!(
                "{} has update numbers out of order",
                product.product_name
            ));
        }
        if let Some(cancellation) = &product.cancellation
            && cancellation.edition_number != product.edition_number
        {
            return Some(format!(
                "{} cancels edition {} but edition {} was requested",
                product.product_name, cancellation.edition_number, product.edition_number
            ));
        }
        None
    }
}

impl ProductValidator for BasicProductValidator {
    fn validate(&self, products: &[Product]) -> ValidationResult {
        ValidationResult {
            errors: products.iter().filter_map(Self::check).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProductCancellation;

    fn product(name: &str, updates: Vec<u32>) -> Product {
        Product {
            product_name: name.to_string(),
            edition_number: 4,
            update_numbers: updates,
            file_size: 100,
            cancellation: None,
        }
    }

    #[test]
    fn accepts_well_formed_products() {
        let result = BasicProductValidator.validate(&[
            product("GB100001", vec![0, 1, 2]),
            product("FR570001", vec![]),
        ]);
        assert!(result.is_valid());
        assert_eq!(result.first_error(), None);
    }

    #[test]
    fn reports_errors_in_product_order() {
        let result = BasicProductValidator.validate(&[
            product("GB100001", vec![]),
            product("gb1", vec![]),
            product("GB100002", vec![3, 1]),
        ]);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.first_error(), Some("gb1 is not a valid product name"));
        assert!(result.errors[1].contains("out of order"));
    }

    #[test]
    fn rejects_cancellation_of_another_edition() {
        let mut cancelled = product("GB100001", vec![5]);
        cancelled.cancellation = Some(ProductCancellation {
            edition_number: 3,
            update_number: 5,
        });
        let result = BasicProductValidator.validate(&[cancelled]);
        assert!(!result.is_valid());
    }
}
