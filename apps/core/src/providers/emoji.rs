use crate::model::{Action, Candidate, ProviderId};
use crate::registry::{Provider, ProviderError, QueryContext};

const MAX_ROWS: usize = 40;

/// (emoji, name, keywords)
const EMOJI: &[(&str, &str, &str)] = &[
    ("😀", "grinning face", "smile happy joy"),
    ("😂", "face with tears of joy", "laugh lol funny"),
    ("🙂", "slightly smiling face", "smile"),
    ("😉", "winking face", "wink flirt"),
    ("😊", "smiling face with smiling eyes", "blush happy"),
    ("😍", "smiling face with heart eyes", "love crush"),
    ("😎", "smiling face with sunglasses", "cool"),
    ("🤔", "thinking face", "hmm think wonder"),
    ("😐", "neutral face", "meh"),
    ("🙄", "face with rolling eyes", "eyeroll whatever"),
    ("😴", "sleeping face", "tired sleep zzz"),
    ("😭", "loudly crying face", "sad cry tears"),
    ("😱", "face screaming in fear", "scared shock"),
    ("😡", "pouting face", "angry mad rage"),
    ("🤯", "exploding head", "mind blown shocked"),
    ("🥳", "partying face", "party celebrate birthday"),
    ("🤝", "handshake", "deal agreement"),
    ("👍", "thumbs up", "yes ok approve like +1"),
    ("👎", "thumbs down", "no dislike -1"),
    ("👏", "clapping hands", "applause bravo"),
    ("🙏", "folded hands", "please thanks pray"),
    ("👋", "waving hand", "hello hi bye wave"),
    ("💪", "flexed biceps", "strong muscle"),
    ("👀", "eyes", "look see watch"),
    ("🧠", "brain", "smart think"),
    ("❤️", "red heart", "love like"),
    ("💔", "broken heart", "sad breakup"),
    ("🔥", "fire", "hot lit flame"),
    ("✨", "sparkles", "shiny magic new"),
    ("⭐", "star", "favorite"),
    ("🎉", "party popper", "celebrate tada congratulations"),
    ("🎁", "wrapped gift", "present birthday"),
    ("✅", "check mark button", "done yes ok"),
    ("❌", "cross mark", "no wrong cancel"),
    ("⚠️", "warning", "caution alert"),
    ("❓", "question mark", "what help"),
    ("💡", "light bulb", "idea tip"),
    ("🚀", "rocket", "launch ship fast"),
    ("🐛", "bug", "insect defect"),
    ("🔧", "wrench", "fix tool settings"),
    ("🔒", "locked", "secure padlock"),
    ("🔑", "key", "password unlock"),
    ("📌", "pushpin", "pin location"),
    ("📎", "paperclip", "attach"),
    ("📝", "memo", "note write"),
    ("📅", "calendar", "date schedule"),
    ("⏰", "alarm clock", "time wake"),
    ("💻", "laptop", "computer work"),
    ("📱", "mobile phone", "phone cell"),
    ("📧", "e-mail", "mail letter"),
    ("☕", "hot beverage", "coffee tea"),
    ("🍕", "pizza", "food"),
    ("🍺", "beer mug", "drink cheers"),
    ("🐍", "snake", "python"),
    ("🦀", "crab", "rust ferris"),
    ("🐧", "penguin", "linux tux"),
    ("🐱", "cat face", "cat kitten pet"),
    ("🐶", "dog face", "dog puppy pet"),
    ("🌍", "globe showing europe-africa", "world earth"),
    ("☀️", "sun", "weather sunny"),
    ("🌧️", "cloud with rain", "weather rain"),
    ("❄️", "snowflake", "cold winter"),
    ("🌈", "rainbow", "pride weather"),
    ("💯", "hundred points", "perfect score 100"),
    ("💩", "pile of poo", "poop"),
    ("🤷", "person shrugging", "shrug dunno"),
    ("🤦", "person facepalming", "facepalm ugh"),
    ("🙈", "see-no-evil monkey", "monkey oops"),
    ("➡️", "right arrow", "next"),
    ("⬅️", "left arrow", "back previous"),
];

/// Built-in emoji table; selecting a row copies the glyph.
pub struct EmojiPicker;

impl Provider for EmojiPicker {
    fn id(&self) -> ProviderId {
        ProviderId::Emoji
    }

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        let needle = query.residual.trim().to_lowercase();
        Ok(matching(&needle)
            .into_iter()
            .take(MAX_ROWS)
            .map(|(emoji, name)| {
                Candidate::new(
                    format!("emoji:{name}"),
                    format!("{emoji}  {name}"),
                    Action::CopyText {
                        text: emoji.to_string(),
                    },
                )
                .with_subtitle("Copy emoji")
                .with_icon("face-smile")
                .pinned()
            })
            .collect())
    }
}

/// Name prefix hits first, then name substrings, then keyword hits.
pub fn matching(needle: &str) -> Vec<(&'static str, &'static str)> {
    if needle.is_empty() {
        return EMOJI.iter().map(|(e, n, _)| (*e, *n)).collect();
    }
    let mut ranked: Vec<(u8, &'static str, &'static str)> = EMOJI
        .iter()
        .filter_map(|(emoji, name, keywords)| {
            let tier = if name.starts_with(needle) {
                0
            } else if name.contains(needle) {
                1
            } else if keywords.split_whitespace().any(|k| k.starts_with(needle)) {
                2
            } else {
                return None;
            };
            Some((tier, *emoji, *name))
        })
        .collect();
    ranked.sort_by_key(|(tier, _, _)| *tier);
    ranked.into_iter().map(|(_, e, n)| (e, n)).collect()
}

#[cfg(test)]
mod tests {
    use super::{matching, EmojiPicker};
    use crate::model::Action;
    use crate::registry::{Provider, QueryContext};

    #[test]
    fn keywords_find_emoji() {
        let hits = matching("rust");
        assert_eq!(hits, vec![("🦀", "crab")]);
    }

    #[test]
    fn name_prefix_beats_keyword() {
        let hits = matching("fire");
        assert_eq!(hits[0].1, "fire");
    }

    #[test]
    fn rows_copy_the_glyph() {
        let rows = EmojiPicker.search(&QueryContext::new("thumbs up")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].action,
            Action::CopyText {
                text: "👍".to_string()
            }
        );
    }
}
