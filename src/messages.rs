// src/messages.rs
use crate::config::Claimable;

pub fn claim_private_message(tutorial_link: &str, claimable: &Claimable) -> String {
    let links = claimable
        .iter()
        .map(|(project, url)| format!("**{}**: {}", project, url))
        .collect::<Vec<_>>()
        .join("; ");

    if tutorial_link.is_empty() {
        format!("Click URLs to claim your POAP.\n{}", links)
    } else {
        format!(
            "Click URLs to claim your POAP.\
            (If you are not familiar with it, please refer to <POAP Issue & Claim Tutorial> at {})\n{}",
            tutorial_link, links
        )
    }
}

pub fn claim_success_message(user: &str) -> String {
    format!("👍 Succeeded. **{}** please check your DM :)", user)
}

pub fn claim_rejection_message(user: &str) -> String {
    format!("😑 **{}** is not a valid user to claim.", user)
}

pub fn whitelist_mention_message(mentions: &[String], project: &str, spell: &str) -> String {
    format!(
        "Hey~ \n\
        {}\n\
        You are in **whitelist** of {}, send `{}` to claim here.\n\
        Ignore if you've already done it.",
        mentions.join(" "),
        project,
        spell
    )
}

pub fn stat_mention_message(mentions: &[String], spell: &str) -> String {
    format!(
        "Hey guys:\n\
        {}\n\
        You are already added to **whitelist**, send `{}` to claim here.\n\
        Ignore if you've already done it.",
        mentions.join(" "),
        spell
    )
}

pub fn relay_receipt_message() -> String {
    "Your DM well received, thinking...".to_string()
}

pub fn relay_usage_message(prefix: &str, delimiter: &str) -> String {
    format!(
        "To send an indirect message, reply with `{p}{d}<user ID or name#tag>{d}<message>`",
        p = prefix,
        d = delimiter
    )
}

pub fn relay_success_message(target: &str, body: &str) -> String {
    format!("Successfully sent to {}: \"{}\"", target, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_message_lists_every_project() {
        let mut claimable = Claimable::new();
        claimable.insert("Alpha".to_string(), "urlA".to_string());
        claimable.insert("Beta".to_string(), "urlB".to_string());

        let msg = claim_private_message("https://tutorial", &claimable);
        assert!(msg.contains("https://tutorial"));
        assert!(msg.ends_with("**Alpha**: urlA; **Beta**: urlB"));
    }

    #[test]
    fn test_mention_message_includes_spell() {
        let msg = whitelist_mention_message(
            &["<@1>".to_string(), "<@2>".to_string()],
            "Alpha",
            "WhereIsMyPOAP",
        );
        assert!(msg.contains("<@1> <@2>"));
        assert!(msg.contains("`WhereIsMyPOAP`"));
    }
}
