// src/common/documents.rs
//
// Normalização das chaves de identidade brasileiras (CPF, e-mail, telefone).

use crate::common::error::AppError;

/// Remove máscara e valida os dígitos verificadores do CPF.
/// Retorna os 11 dígitos ("52998224725").
pub fn normalize_cpf(raw: &str) -> Result<String, AppError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() != 11 || !is_valid_cpf(&digits) {
        return Err(AppError::InvalidCpf(raw.trim().to_string()));
    }

    Ok(digits)
}

fn is_valid_cpf(digits: &str) -> bool {
    let nums: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    if nums.len() != 11 {
        return false;
    }

    // "111.111.111-11" passa no cálculo mas não é um CPF válido
    if nums.iter().all(|&d| d == nums[0]) {
        return false;
    }

    check_digit(&nums[..9]) == nums[9] && check_digit(&nums[..10]) == nums[10]
}

fn check_digit(prefix: &[u32]) -> u32 {
    let weight_start = prefix.len() as u32 + 1;
    let sum: u32 = prefix
        .iter()
        .enumerate()
        .map(|(i, d)| d * (weight_start - i as u32))
        .sum();

    match (sum * 10) % 11 {
        10 => 0,
        r => r,
    }
}

pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() { None } else { Some(email) }
}

/// Mantém só os dígitos; "(11) 99999-8888" -> "11999998888".
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() { None } else { Some(digits) }
}

/// Strings em branco contam como ausentes.
pub fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_masked_and_plain_cpf() {
        assert_eq!(normalize_cpf("529.982.247-25").unwrap(), "52998224725");
        assert_eq!(normalize_cpf("11144477735").unwrap(), "11144477735");
    }

    #[test]
    fn rejects_wrong_check_digits_and_repeated_digits() {
        assert!(matches!(normalize_cpf("529.982.247-26"), Err(AppError::InvalidCpf(_))));
        assert!(matches!(normalize_cpf("111.111.111-11"), Err(AppError::InvalidCpf(_))));
        assert!(matches!(normalize_cpf("1234"), Err(AppError::InvalidCpf(_))));
    }

    #[test]
    fn check_digit_zero_when_remainder_is_ten() {
        // 987.654.321-00
        assert_eq!(normalize_cpf("98765432100").unwrap(), "98765432100");
    }

    #[test]
    fn email_and_phone_normalization() {
        assert_eq!(normalize_email("  Maria@Email.COM "), Some("maria@email.com".into()));
        assert_eq!(normalize_email("   "), None);
        assert_eq!(normalize_phone("(11) 99999-8888"), Some("11999998888".into()));
        assert_eq!(normalize_phone("--"), None);
    }
}
