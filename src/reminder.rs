// 📱 Payment Reminders - WhatsApp links for members who have not paid

use crate::debt::MemberStatus;
use crate::models::{Member, MemberId};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reminder {
    pub member_id: MemberId,
    pub name: String,
    pub amount: Decimal,
    pub link: String,
}

/// Message text sent to the member
pub fn reminder_text(member: &Member) -> String {
    format!("Hola {}, tu pago vence hoy.", member.name)
}

/// `https://wa.me/<digits>?text=...`, or `None` when the member has no usable phone
pub fn whatsapp_link(member: &Member) -> Option<String> {
    let digits: String = member
        .phone
        .as_deref()?
        .chars()
        .filter(char::is_ascii_digit)
        .collect();

    if digits.is_empty() {
        return None;
    }

    Some(format!(
        "https://wa.me/{}?text={}",
        digits,
        urlencoding::encode(&reminder_text(member))
    ))
}

/// Reminders for every unpaid member that can be reached
pub fn reminders_for<'a>(statuses: impl IntoIterator<Item = &'a MemberStatus>) -> Vec<Reminder> {
    statuses
        .into_iter()
        .filter(|status| !status.is_paid)
        .filter_map(|status| {
            whatsapp_link(&status.member).map(|link| Reminder {
                member_id: status.member.id,
                name: status.member.name.clone(),
                amount: status.member.monthly_due,
                link,
            })
        })
        .collect()
}
