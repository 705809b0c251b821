//! A client that makes up traffic, for working on rendering without a
//! live room.
//!
//! Gaps between messages mimic a busy room: mostly a few hundred
//! milliseconds, with an occasional pause of a second or two. Message
//! kinds are drawn by weight, so text dominates and gifts are rare.

use std::time::Duration;

use blivechat_command::{
    AuthorType, ChatMessage, GiftMessage, GuardLevel, MembershipMessage, MessageHandler,
    SuperChatDelete, SuperChatMessage, TextMessage, TranslationUpdate,
};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::link::Link;
use crate::{LinkState, SyntheticConfig};

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

const NAMES: &[&str] = &[
    "成龙",
    "杨戬",
    "孙悟空",
    "哈基米",
    "大张伟",
    "周冠宇",
    "五条悟",
    "博丽灵梦",
    "御剑侍伶",
    "田所浩二",
    "小岛秀夫",
    "長崎そよ",
    "柚木つばめ",
    "空條承太郎",
    "みもりあいの",
    "ディオ・ブランドー",
    "Dante",
    "xQcOW",
    "Makarov",
    "xfgryujk",
    "Jim Hacker",
    "Rick Astley",
    "Tifa Lockhart",
    "Arthur Morgan",
];

const CONTENTS: &[&str] = &[
    "草",
    "会赢的",
    "让我看看",
    "卑鄙的外乡人",
    "我不做人了，JOJO",
    "已经没有什么好怕的了",
    "你这猴子，真令我欢喜",
    "[dog]文本[比心]表情[喝彩]",
    "阿祖，投降吧，外面全是警察",
    "無駄無駄無駄無駄無駄無駄無駄無駄",
    "我衰咗三年，我等緊個機會，爭番口氣",
    "因为你的缘故，我的心中萌生了多余的情感",
    "迷えば、敗れる",
    "逃げるんだよォ！",
    "届かない恋をしていても",
    "なんで春日影やったの！？",
    "kksk",
    "Y.M.C.A.",
    "8888888888",
    "text[吃瓜]emoticon",
    "Remember... no Russian",
    "Never gonna give you up",
    "DU↗DU→DU↗DU↓ Max Verstappen",
    "Farewell, ashen one. May the flame guide thee",
    "Hey Vergil, your portal opening days are over. Give me the Yamato",
];

const EMOTICONS: &[&str] = &[
    "/static/img/emoticons/233.png",
    "/static/img/emoticons/miaoa.png",
    "/static/img/emoticons/lipu.png",
    "/static/img/emoticons/huangdou_xihuan.png",
    "/static/img/emoticons/sakaban_jiayu_yutou.png",
];

const AUTHOR_TYPES: &[(AuthorType, u32)] = &[
    (AuthorType::Normal, 10),
    (AuthorType::GuardMember, 5),
    (AuthorType::Admin, 2),
    (AuthorType::Owner, 1),
];

struct GiftInfo {
    name: &'static str,
    paid_coin: u64,
    free_coin: u64,
    count: u32,
}

const GIFTS: &[GiftInfo] = &[
    GiftInfo { name: "辣条", paid_coin: 0, free_coin: 1000, count: 10 },
    GiftInfo { name: "B坷垃", paid_coin: 9900, free_coin: 0, count: 1 },
    GiftInfo { name: "礼花", paid_coin: 28000, free_coin: 0, count: 1 },
    GiftInfo { name: "花式夸夸", paid_coin: 39000, free_coin: 0, count: 1 },
    GiftInfo { name: "天空之翼", paid_coin: 100000, free_coin: 0, count: 1 },
    GiftInfo { name: "摩天大楼", paid_coin: 450000, free_coin: 0, count: 1 },
    GiftInfo { name: "小电视飞船", paid_coin: 1245000, free_coin: 0, count: 1 },
];

const SUPER_CHAT_PRICES: &[f64] = &[30.0, 50.0, 100.0, 200.0, 500.0, 1000.0];

#[derive(Debug, Clone, Copy)]
enum Kind {
    Text,
    Emoticon,
    Gift,
    SuperChat,
    Member,
}

const KINDS: &[(Kind, u32)] = &[
    (Kind::Text, 20),
    (Kind::Emoticon, 5),
    (Kind::Gift, 1),
    (Kind::SuperChat, 3),
    (Kind::Member, 1),
];

/// Monthly price in gold coins.
fn guard_price(level: GuardLevel) -> u64 {
    match level {
        GuardLevel::Governor => 19_998_000,
        GuardLevel::Admiral => 1_998_000,
        _ => 198_000,
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Draws messages and gaps. Separate from the task so it can be tested
/// without timers.
pub(crate) struct Generator {
    config: SyntheticConfig,
    rng: StdRng,
}

impl Generator {
    pub(crate) fn new(config: SyntheticConfig) -> Self {
        let config = config.validated();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { config, rng }
    }

    /// Time until the next message.
    pub(crate) fn next_gap(&mut self) -> Duration {
        let (min, max) = if self.rng.random_bool(self.config.pause_probability) {
            self.config.pause_gap
        } else {
            self.config.burst_gap
        };
        self.duration_between(min, max)
    }

    fn duration_between(&mut self, min: Duration, max: Duration) -> Duration {
        let ms = self
            .rng
            .random_range(min.as_millis() as u64..=max.as_millis() as u64);
        Duration::from_millis(ms)
    }

    fn pick<T: Copy>(&mut self, items: &[T]) -> Option<T> {
        items.choose(&mut self.rng).copied()
    }

    fn pick_weighted<T: Copy>(&mut self, items: &[(T, u32)]) -> Option<T> {
        items
            .choose_weighted(&mut self.rng, |item| item.1)
            .ok()
            .map(|item| item.0)
    }

    fn name(&mut self) -> String {
        self.pick(NAMES).unwrap_or_default().to_owned()
    }

    fn chance(&mut self, one_in: u32) -> bool {
        self.rng.random_range(1..=one_in) == 1
    }

    /// One message plus, optionally, a follow-up to deliver after the
    /// returned delay.
    pub(crate) fn next_message(&mut self) -> (ChatMessage, Option<(Duration, ChatMessage)>) {
        match self.pick_weighted(KINDS).unwrap_or(Kind::Text) {
            Kind::Text => {
                let content = self.pick(CONTENTS).unwrap_or_default().to_owned();
                let text = self.text(content, None);
                let followup = self
                    .rng
                    .random_bool(self.config.translation_probability)
                    .then(|| {
                        let update = TranslationUpdate {
                            id: text.id.clone(),
                            translation: format!("({})", text.content),
                        };
                        (self.followup_delay(), ChatMessage::UpdateTranslation(update))
                    });
                (ChatMessage::AddText(text), followup)
            }
            Kind::Emoticon => {
                let url = self.pick(EMOTICONS).map(str::to_owned);
                (ChatMessage::AddText(self.text(String::new(), url)), None)
            }
            Kind::Gift => {
                let gift = GIFTS
                    .choose(&mut self.rng)
                    .map_or(GiftMessage::default(), |info| GiftMessage {
                        paid_coin_total: info.paid_coin,
                        free_coin_total: info.free_coin,
                        gift_name: info.name.to_owned(),
                        count: info.count,
                        ..GiftMessage::default()
                    });
                let gift = GiftMessage {
                    author_name: self.name(),
                    ..gift
                };
                (ChatMessage::AddGift(gift), None)
            }
            Kind::SuperChat => {
                let sc = SuperChatMessage {
                    author_name: self.name(),
                    price: self.pick(SUPER_CHAT_PRICES).unwrap_or(30.0),
                    content: self.pick(CONTENTS).unwrap_or_default().to_owned(),
                    ..SuperChatMessage::default()
                };
                let followup = self
                    .rng
                    .random_bool(self.config.deletion_probability)
                    .then(|| {
                        let delete = SuperChatDelete {
                            ids: vec![sc.id.clone()],
                        };
                        (self.followup_delay(), ChatMessage::DelSuperChat(delete))
                    });
                (ChatMessage::AddSuperChat(sc), followup)
            }
            Kind::Member => {
                let guard_level = GuardLevel::from_raw(self.rng.random_range(1..=3));
                let member = MembershipMessage {
                    author_name: self.name(),
                    guard_level,
                    total_price: guard_price(guard_level),
                    ..MembershipMessage::default()
                };
                (ChatMessage::AddMember(member), None)
            }
        }
    }

    fn followup_delay(&mut self) -> Duration {
        let (min, max) = self.config.followup_delay;
        self.duration_between(min, max)
    }

    fn text(&mut self, content: String, emoticon_image_url: Option<String>) -> TextMessage {
        let author_type = self.pick_weighted(AUTHOR_TYPES).unwrap_or_default();
        let guard_level = match author_type {
            AuthorType::GuardMember => self.rng.random_range(1..=3),
            AuthorType::Admin => self.rng.random_range(0..=3),
            _ => 0,
        };
        TextMessage {
            author_name: self.name(),
            author_type,
            content,
            guard_level: GuardLevel::from_raw(guard_level),
            is_gift_triggered: self.chance(10),
            author_level: self.rng.random_range(1..=60),
            is_new_account: self.chance(10),
            is_phone_verified: !self.chance(10),
            medal_level: self.rng.random_range(0..=40),
            emoticon_image_url,
            ..TextMessage::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

pub(crate) struct SyntheticDriver<H> {
    generator: Generator,
    link: Link<H>,
    /// Follow-ups not yet due, in no particular order.
    pending: Vec<(Instant, ChatMessage)>,
}

impl<H: MessageHandler> SyntheticDriver<H> {
    pub(crate) fn new(config: SyntheticConfig, link: Link<H>) -> Self {
        Self {
            generator: Generator::new(config),
            link,
            pending: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        info!(client = self.link.name(), "client started");
        self.link.set_state(LinkState::Connecting);
        self.link.set_state(LinkState::Live);

        let mut next = Instant::now() + self.generator.next_gap();
        loop {
            let followup_at = self.pending.iter().map(|(at, _)| *at).min();
            tokio::select! {
                () = self.link.stopped() => break,
                () = time::sleep_until(next) => {
                    next = Instant::now() + self.generator.next_gap();
                    let (msg, followup) = self.generator.next_message();
                    debug!(client = self.link.name(), kind = msg.kind(), "generated");
                    self.link.deliver(msg);
                    if let Some((delay, later)) = followup {
                        self.pending.push((Instant::now() + delay, later));
                    }
                    self.link.publish();
                }
                () = sleep_until_opt(followup_at) => self.deliver_due(),
            }
        }
        self.link.terminate();
    }

    fn deliver_due(&mut self) {
        let now = Instant::now();
        let (due, later): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.pending).into_iter().partition(|(at, _)| *at <= now);
        self.pending = later;
        for (_, msg) in due {
            self.link.deliver(msg);
        }
        self.link.publish();
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
