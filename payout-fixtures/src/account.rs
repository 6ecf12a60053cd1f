use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How a synthetic payment account identifier is laid out for a given
/// [`PaymentMethod`]. The layout is a pure function of the method, only the
/// digits are random.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountTemplate {
    /// `prefix` followed by a number in `low..=high` without leading zeros
    Numbered {
        prefix: &'static str,
        low: u64,
        high: u64,
    },
    /// `prefix` followed by exactly `digits` digits, the first one non-zero
    Digits { prefix: &'static str, digits: u32 },
    /// `<local><n>@email.com` with `n` in `low..=high`
    Email {
        local: &'static str,
        low: u64,
        high: u64,
    },
}

const EMAIL_DOMAIN: &str = "@email.com";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentMethod {
    Wechat,
    Alipay,
    Bank,
    Paypal,
    Venmo,
    CashApp,
    Zelle,
    Stripe,
    Wise,
    Payoneer,
    Swift,
    /// A tag with no account template
    Unknown(String),
}

/// What to store as `payment_account` when a fixture's method has no template
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownMethodPolicy {
    /// Store an empty string ("no account on file")
    #[default]
    Empty,
    /// Refuse the configuration up front
    Reject,
}

impl AccountTemplate {
    pub fn render<R: Rng + ?Sized>(self, rng: &mut R) -> String {
        match self {
            AccountTemplate::Numbered { prefix, low, high } => {
                format!("{}{}", prefix, rng.gen_range(low..=high))
            }
            AccountTemplate::Digits { prefix, digits } => {
                let low = 10_u64.pow(digits - 1);
                format!("{}{}", prefix, rng.gen_range(low..low * 10))
            }
            AccountTemplate::Email { local, low, high } => {
                format!("{}{}{}", local, rng.gen_range(low..=high), EMAIL_DOMAIN)
            }
        }
    }

    #[must_use]
    pub fn matches(self, account: &str) -> bool {
        match self {
            AccountTemplate::Numbered { prefix, low, high } => account
                .strip_prefix(prefix)
                .and_then(parse_canonical)
                .map_or(false, |n| (low..=high).contains(&n)),
            AccountTemplate::Digits { prefix, digits } => {
                account.strip_prefix(prefix).map_or(false, |rest| {
                    rest.len() == digits as usize && parse_canonical(rest).is_some()
                })
            }
            AccountTemplate::Email { local, low, high } => account
                .strip_prefix(local)
                .and_then(|rest| rest.strip_suffix(EMAIL_DOMAIN))
                .and_then(parse_canonical)
                .map_or(false, |n| (low..=high).contains(&n)),
        }
    }
}

/// Parses a run of ASCII digits with no sign and no leading zero.
fn parse_canonical(digits: &str) -> Option<u64> {
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    digits.parse().ok()
}

impl PaymentMethod {
    pub const KNOWN: [PaymentMethod; 11] = [
        PaymentMethod::Wechat,
        PaymentMethod::Alipay,
        PaymentMethod::Bank,
        PaymentMethod::Paypal,
        PaymentMethod::Venmo,
        PaymentMethod::CashApp,
        PaymentMethod::Zelle,
        PaymentMethod::Stripe,
        PaymentMethod::Wise,
        PaymentMethod::Payoneer,
        PaymentMethod::Swift,
    ];

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            PaymentMethod::Wechat => "wechat",
            PaymentMethod::Alipay => "alipay",
            PaymentMethod::Bank => "bank",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Venmo => "venmo",
            PaymentMethod::CashApp => "cash_app",
            PaymentMethod::Zelle => "zelle",
            PaymentMethod::Stripe => "stripe",
            PaymentMethod::Wise => "wise",
            PaymentMethod::Payoneer => "payoneer",
            PaymentMethod::Swift => "swift",
            PaymentMethod::Unknown(tag) => tag,
        }
    }

    #[must_use]
    pub fn template(&self) -> Option<AccountTemplate> {
        let template = match self {
            PaymentMethod::Wechat => AccountTemplate::Numbered {
                prefix: "wx_",
                low: 100_000,
                high: 999_999,
            },
            PaymentMethod::Alipay => AccountTemplate::Numbered {
                prefix: "ali_",
                low: 100_000,
                high: 999_999,
            },
            PaymentMethod::Bank => AccountTemplate::Digits {
                prefix: "6222",
                digits: 16,
            },
            PaymentMethod::Paypal => AccountTemplate::Email {
                local: "paypal",
                low: 1,
                high: 10_000,
            },
            PaymentMethod::Venmo => AccountTemplate::Numbered {
                prefix: "@venmo_user_",
                low: 1,
                high: 10_000,
            },
            PaymentMethod::CashApp => AccountTemplate::Numbered {
                prefix: "$cashapp_",
                low: 1,
                high: 10_000,
            },
            PaymentMethod::Zelle => AccountTemplate::Email {
                local: "zelle",
                low: 1,
                high: 10_000,
            },
            PaymentMethod::Stripe => AccountTemplate::Digits {
                prefix: "acct_",
                digits: 16,
            },
            PaymentMethod::Wise => AccountTemplate::Numbered {
                prefix: "wise_",
                low: 100_000,
                high: 999_999,
            },
            PaymentMethod::Payoneer => AccountTemplate::Email {
                local: "payoneer",
                low: 1,
                high: 10_000,
            },
            PaymentMethod::Swift => AccountTemplate::Numbered {
                prefix: "SWIFT",
                low: 100_000,
                high: 999_999,
            },
            PaymentMethod::Unknown(_) => return None,
        };
        Some(template)
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, PaymentMethod::Unknown(_))
    }

    /// Draws an account identifier for this method. `None` means the method
    /// has no template; callers decide what that becomes.
    pub fn generate_account<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        self.template().map(|template| template.render(rng))
    }

    /// Whether `account` has the layout this method generates. Always false
    /// for [`PaymentMethod::Unknown`].
    #[must_use]
    pub fn matches_account(&self, account: &str) -> bool {
        self.template()
            .map_or(false, |template| template.matches(account))
    }
}

impl From<String> for PaymentMethod {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "wechat" => PaymentMethod::Wechat,
            "alipay" => PaymentMethod::Alipay,
            "bank" => PaymentMethod::Bank,
            "paypal" => PaymentMethod::Paypal,
            "venmo" => PaymentMethod::Venmo,
            "cash_app" => PaymentMethod::CashApp,
            "zelle" => PaymentMethod::Zelle,
            "stripe" => PaymentMethod::Stripe,
            "wise" => PaymentMethod::Wise,
            "payoneer" => PaymentMethod::Payoneer,
            "swift" => PaymentMethod::Swift,
            _ => PaymentMethod::Unknown(tag),
        }
    }
}

impl From<&str> for PaymentMethod {
    fn from(tag: &str) -> Self {
        PaymentMethod::from(tag.to_owned())
    }
}

impl From<PaymentMethod> for String {
    fn from(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Unknown(tag) => tag,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn digits_after<'a>(account: &'a str, prefix: &str) -> &'a str {
        account.strip_prefix(prefix).unwrap()
    }

    #[test]
    fn test_wechat_account_is_six_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let account = PaymentMethod::Wechat.generate_account(&mut rng).unwrap();
            let digits = digits_after(&account, "wx_");
            assert_eq!(digits.len(), 6);
            assert!(digits.bytes().all(|b| b.is_ascii_digit()));
            assert!(PaymentMethod::Wechat.matches_account(&account));
        }
    }

    #[test]
    fn test_paypal_account_is_email_like() {
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..200 {
            let account = PaymentMethod::Paypal.generate_account(&mut rng).unwrap();
            assert!(account.starts_with("paypal"));
            assert!(account.ends_with("@email.com"));
            let n: u64 = account["paypal".len()..account.len() - "@email.com".len()]
                .parse()
                .unwrap();
            assert!((1..=10_000).contains(&n));
        }
    }

    #[test]
    fn test_bank_account_is_card_like() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            let account = PaymentMethod::Bank.generate_account(&mut rng).unwrap();
            assert_eq!(account.len(), 20);
            assert!(account.starts_with("6222"));
            assert!(account.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_every_known_method_matches_its_own_template() {
        let mut rng = StdRng::seed_from_u64(10);
        for method in PaymentMethod::KNOWN {
            for _ in 0..50 {
                let account = method.generate_account(&mut rng).unwrap();
                assert!(
                    method.matches_account(&account),
                    "{} produced {}",
                    method,
                    account
                );
            }
        }
    }

    #[test]
    fn test_templates_do_not_cross_match() {
        let mut rng = StdRng::seed_from_u64(11);
        let account = PaymentMethod::Paypal.generate_account(&mut rng).unwrap();
        assert!(!PaymentMethod::Zelle.matches_account(&account));
        assert!(!PaymentMethod::Payoneer.matches_account(&account));

        let account = PaymentMethod::Wechat.generate_account(&mut rng).unwrap();
        assert!(!PaymentMethod::Alipay.matches_account(&account));
        assert!(!PaymentMethod::Wechat.matches_account("wx_012345"));
        assert!(!PaymentMethod::Wechat.matches_account("wx_12345"));
        assert!(!PaymentMethod::Bank.matches_account("6222123"));
    }

    #[test]
    fn test_unknown_method_has_no_account() {
        let mut rng = StdRng::seed_from_u64(12);
        let method = PaymentMethod::from("bitcoin");
        assert_eq!(method, PaymentMethod::Unknown("bitcoin".to_owned()));
        assert!(!method.is_known());
        assert_eq!(method.template(), None);
        assert_eq!(method.generate_account(&mut rng), None);
        assert!(!method.matches_account(""));
    }

    #[test]
    fn test_tag_round_trip() {
        for method in PaymentMethod::KNOWN {
            let tag = String::from(method.clone());
            assert_eq!(PaymentMethod::from(tag), method);
        }
        assert_eq!(PaymentMethod::CashApp.as_str(), "cash_app");
        let parsed: Vec<PaymentMethod> = serde_json::from_str(r#"["zelle", "wire"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![PaymentMethod::Zelle, PaymentMethod::Unknown("wire".to_owned())]
        );
    }
}
