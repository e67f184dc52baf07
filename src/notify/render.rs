//! Telegram HTML rendering. Times are shown in Beijing time (UTC+8) for
//! every subscriber.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use html_escape::encode_text;

use super::Lang;
use crate::event::EconomicEvent;

const DISPLAY_OFFSET_HOURS: i64 = 8;

pub const NO_EVENTS_EN: &str = "No major events in the next 24 hours.";
pub const NO_EVENTS_ZH: &str = "未来24小时内没有重要经济数据。";
pub const FETCH_FAILED: &str =
    "⚠️ Could not fetch upcoming events, please try again later.\n⚠️ 暂时无法获取经济日历，请稍后再试。";

/// Longest matches first: "core cpi" must win over "cpi".
const GLOSSARY: [(&str, &str); 18] = [
    ("core cpi", "核心CPI"),
    ("core pce", "核心PCE物价指数"),
    ("cpi", "消费者物价指数"),
    ("ppi", "生产者物价指数"),
    ("pce", "个人消费支出物价指数"),
    ("nonfarm", "非农就业人数"),
    ("non-farm", "非农就业人数"),
    ("nfp", "非农就业人数"),
    ("jobless claims", "初请失业金人数"),
    ("unemployment", "失业率"),
    ("fomc", "美联储利率决议"),
    ("interest rate", "利率决议"),
    ("lpr", "贷款市场报价利率"),
    ("gdp", "国内生产总值"),
    ("manufacturing pmi", "制造业PMI"),
    ("pmi", "采购经理人指数"),
    ("retail sales", "零售销售"),
    ("inflation", "通胀率"),
];

pub fn display_time(t: DateTime<Utc>) -> String {
    (t + ChronoDuration::hours(DISPLAY_OFFSET_HOURS))
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

/// Chinese label for a known indicator, if any.
pub fn glossary_zh(title: &str) -> Option<&'static str> {
    let t = title.to_lowercase();
    GLOSSARY
        .iter()
        .find(|(term, _)| t.contains(term))
        .map(|(_, zh)| *zh)
}

fn figures(ev: &EconomicEvent, forecast: &str, previous: &str, sep: &str) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(f) = &ev.forecast {
        parts.push(format!("{forecast}{sep}{}", encode_text(f)));
    }
    if let Some(p) = &ev.previous {
        parts.push(format!("{previous}{sep}{}", encode_text(p)));
    }
    (!parts.is_empty()).then(|| parts.join(" | "))
}

fn render_en(ev: &EconomicEvent) -> String {
    let mut lines = vec![
        format!(
            "{} <b>{}</b> · {}",
            ev.country.flag(),
            ev.country.name_en(),
            encode_text(&ev.title)
        ),
        format!("🕒 {} (Beijing time)", display_time(ev.scheduled_at)),
    ];
    if let Some(f) = figures(ev, "Forecast", "Previous", ": ") {
        lines.push(f);
    }
    if let Some(i) = ev.importance {
        lines.push(format!("Impact: {}", i.label_en()));
    }
    lines.join("\n")
}

fn render_zh(ev: &EconomicEvent) -> String {
    let title = match glossary_zh(&ev.title) {
        Some(zh) => format!("{}（{zh}）", encode_text(&ev.title)),
        None => encode_text(&ev.title).into_owned(),
    };
    let mut lines = vec![
        format!("{} <b>{}</b> · {title}", ev.country.flag(), ev.country.name_zh()),
        format!("🕒 北京时间 {}", display_time(ev.scheduled_at)),
    ];
    if let Some(f) = figures(ev, "预期", "前值", "：") {
        lines.push(f);
    }
    if let Some(i) = ev.importance {
        lines.push(format!("重要性：{}", i.label_zh()));
    }
    lines.join("\n")
}

pub fn render(ev: &EconomicEvent, lang: Lang) -> String {
    match lang {
        Lang::En => render_en(ev),
        Lang::Zh => render_zh(ev),
        Lang::Both => format!("{}\n\n{}", render_en(ev), render_zh(ev)),
    }
}

pub fn no_events(lang: Lang) -> String {
    match lang {
        Lang::En => NO_EVENTS_EN.to_string(),
        Lang::Zh => NO_EVENTS_ZH.to_string(),
        Lang::Both => format!("{NO_EVENTS_EN}\n{NO_EVENTS_ZH}"),
    }
}

fn list_header(lang: Lang) -> &'static str {
    match lang {
        Lang::En => "📅 <b>Upcoming events</b>",
        Lang::Zh => "📅 <b>即将公布</b>",
        Lang::Both => "📅 <b>Upcoming events / 即将公布</b>",
    }
}

/// List body for `/upcoming` and the public read endpoint.
pub fn render_list(events: &[EconomicEvent], lang: Lang) -> String {
    if events.is_empty() {
        return no_events(lang);
    }
    let body = events
        .iter()
        .map(|e| render(e, lang))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{}\n\n{body}", list_header(lang))
}
