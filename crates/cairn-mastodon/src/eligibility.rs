use cairn_core::types::Visibility;

use crate::types::Account;

/// Whether a status is eligible for fact collection. `ignore_url_requirement`
/// is the explicit override used for verified peer bots, per the Open
/// Question decision recorded in DESIGN.md: rather than duplicating this
/// function, the override is a parameter.
pub fn should_collect(
    visibility: Visibility,
    author: &Account,
    body: &str,
    ignore_url_requirement: bool,
) -> bool {
    let visibility_ok = match visibility {
        Visibility::Public => true,
        Visibility::Unlisted => author.bot,
        Visibility::Private | Visibility::Direct => false,
    };
    if !visibility_ok {
        return false;
    }

    if body.contains('@') {
        return false;
    }

    if ignore_url_requirement {
        return true;
    }

    body.contains("http://") || body.contains("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(bot: bool) -> Account {
        Account {
            id: "1".into(),
            username: "u".into(),
            acct: "u".into(),
            display_name: "U".into(),
            bot,
            note: String::new(),
            fields: vec![],
        }
    }

    #[test]
    fn property_7_eligibility_matrix() {
        let human = account(false);
        let bot = account(true);

        assert!(should_collect(
            Visibility::Public,
            &human,
            "check this https://example.com",
            false
        ));
        assert!(!should_collect(
            Visibility::Unlisted,
            &human,
            "https://example.com",
            false
        ));
        assert!(should_collect(
            Visibility::Unlisted,
            &bot,
            "https://example.com",
            false
        ));
        assert!(!should_collect(
            Visibility::Private,
            &human,
            "https://example.com",
            false
        ));
        assert!(!should_collect(
            Visibility::Direct,
            &human,
            "https://example.com",
            false
        ));
        assert!(!should_collect(
            Visibility::Public,
            &human,
            "hi @someone https://example.com",
            false
        ));
        assert!(!should_collect(Visibility::Public, &human, "no url here", false));
        assert!(should_collect(
            Visibility::Public,
            &bot,
            "no url here",
            true
        ));
    }
}
