//! English and Vietnamese message catalog.

use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::query::mutation::MutationKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Vi,
}

impl Locale {
    /// Accepts tags like `vi`, `vi_VN.UTF-8` or `en-US`. `C`/`POSIX` map to English.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        let lang = tag
            .trim()
            .split(['_', '-', '.', '@'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match lang.as_str() {
            "vi" => Some(Self::Vi),
            "en" | "c" | "posix" => Some(Self::En),
            _ => None,
        }
    }

    /// `LC_ALL` first, then `LANG`; English when neither names a known language.
    #[must_use]
    pub fn detect() -> Self {
        let lc_all = env::var("LC_ALL").ok();
        let lang = env::var("LANG").ok();
        Self::detect_from(lc_all.as_deref(), lang.as_deref())
    }

    #[must_use]
    pub fn detect_from(lc_all: Option<&str>, lang: Option<&str>) -> Self {
        [lc_all, lang]
            .into_iter()
            .flatten()
            .filter(|tag| !tag.trim().is_empty())
            .find_map(Self::parse)
            .unwrap_or_default()
    }

    /// An explicit setting wins over the environment.
    #[must_use]
    pub fn resolve(configured: &str) -> Self {
        Self::parse(configured).unwrap_or_else(Self::detect)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Vi => "vi",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Loading,
    NoRows,
    LoadFailed,
    LoginSucceeded,
    LoggedOut,
    TwoFactorRequired,
    SessionMissing,
    PasswordChanged,
    ResetCodeSent,
    ResetCodeValid,
    PasswordReset,
    OtpSent,
    OtpVerified,
    ProfileUpdated,
    TwoFactorToggled,
    Registered,
    UploadSucceeded,
    ScanQrHint,
    RequestOtpHint,
    MoreAvailable,
    Selected,
    Assets,
    OpenMaintenance,
    LabUsage,
    ByRoom,
}

/// Looks up strings for one locale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Catalog {
    locale: Locale,
}

impl Catalog {
    #[must_use]
    pub const fn new(locale: Locale) -> Self {
        Self { locale }
    }

    #[must_use]
    pub const fn locale(&self) -> Locale {
        self.locale
    }

    #[must_use]
    pub const fn text(&self, key: MessageKey) -> &'static str {
        match self.locale {
            Locale::En => english(key),
            Locale::Vi => vietnamese(key),
        }
    }

    /// Display name for a resource (`asset`, `room`, ...). Unknown names pass through.
    #[must_use]
    pub fn entity<'a>(&self, name: &'a str) -> &'a str {
        if self.locale == Locale::En {
            return name;
        }
        match name {
            "asset" => "tài sản",
            "category" => "danh mục",
            "location" => "vị trí",
            "room" => "phòng",
            "software" => "phần mềm",
            "maintenance" => "bảo trì",
            "borrowing" => "phiếu mượn",
            "user" => "người dùng",
            "history" => "lịch sử",
            other => other,
        }
    }

    #[must_use]
    pub fn mutation_succeeded(&self, kind: MutationKind, entity: &str) -> String {
        let entity = self.entity(entity);
        match self.locale {
            Locale::En => {
                let verb = match kind {
                    MutationKind::Create => "created",
                    MutationKind::Update => "updated",
                    MutationKind::Delete => "deleted",
                    MutationKind::Duplicate => "duplicated",
                };
                let mut sentence = format!("{entity} {verb} successfully");
                capitalize(&mut sentence);
                sentence
            }
            Locale::Vi => {
                let verb = match kind {
                    MutationKind::Create => "Tạo",
                    MutationKind::Update => "Cập nhật",
                    MutationKind::Delete => "Xóa",
                    MutationKind::Duplicate => "Nhân bản",
                };
                format!("{verb} {entity} thành công")
            }
        }
    }

    #[must_use]
    pub fn mutation_failed(&self, kind: MutationKind, entity: &str, reason: &str) -> String {
        let entity = self.entity(entity);
        match self.locale {
            Locale::En => {
                let verb = match kind {
                    MutationKind::Create => "create",
                    MutationKind::Update => "update",
                    MutationKind::Delete => "delete",
                    MutationKind::Duplicate => "duplicate",
                };
                format!("Failed to {verb} {entity}: {reason}")
            }
            Locale::Vi => {
                let verb = match kind {
                    MutationKind::Create => "tạo",
                    MutationKind::Update => "cập nhật",
                    MutationKind::Delete => "xóa",
                    MutationKind::Duplicate => "nhân bản",
                };
                format!("Không thể {verb} {entity}: {reason}")
            }
        }
    }

    /// `Page 2 of 3` for a zero-based `page`.
    #[must_use]
    pub fn page_position(&self, page: u32, pages: u64) -> String {
        let shown = u64::from(page) + 1;
        let pages = pages.max(1);
        match self.locale {
            Locale::En => format!("Page {shown} of {pages}"),
            Locale::Vi => format!("Trang {shown}/{pages}"),
        }
    }

    /// `12 of 40 rows` for a picker that has loaded part of a list.
    #[must_use]
    pub fn loaded_of(&self, loaded: usize, total: u64) -> String {
        let total = self.total_rows(total);
        match self.locale {
            Locale::En => format!("{loaded} of {total}"),
            Locale::Vi => format!("{loaded}/{total}"),
        }
    }

    #[must_use]
    pub fn borrowings(&self, active: u64, overdue: u64) -> String {
        match self.locale {
            Locale::En => format!("Borrowings: {active} active, {overdue} overdue"),
            Locale::Vi => format!("Phiếu mượn: {active} đang mượn, {overdue} quá hạn"),
        }
    }

    #[must_use]
    pub fn total_rows(&self, total: u64) -> String {
        match self.locale {
            Locale::En if total == 1 => "1 row".to_string(),
            Locale::En => format!("{total} rows"),
            Locale::Vi => format!("{total} dòng"),
        }
    }
}

const fn english(key: MessageKey) -> &'static str {
    match key {
        MessageKey::Loading => "Loading…",
        MessageKey::NoRows => "No rows",
        MessageKey::LoadFailed => "Could not load data",
        MessageKey::LoginSucceeded => "Signed in",
        MessageKey::LoggedOut => "Signed out",
        MessageKey::TwoFactorRequired => "Two-factor verification required",
        MessageKey::SessionMissing => "Not signed in. Run `labdesk login` first.",
        MessageKey::PasswordChanged => "Password changed",
        MessageKey::ResetCodeSent => "A reset code was sent to your email",
        MessageKey::ResetCodeValid => "Reset code accepted",
        MessageKey::PasswordReset => "Password reset. You can sign in now.",
        MessageKey::OtpSent => "A verification code was sent to your email",
        MessageKey::OtpVerified => "Verification succeeded",
        MessageKey::ProfileUpdated => "Profile updated",
        MessageKey::TwoFactorToggled => "Two-factor setting updated",
        MessageKey::Registered => "Account created. Check your email to activate it.",
        MessageKey::UploadSucceeded => "Image uploaded",
        MessageKey::ScanQrHint => "Scan the QR code, then verify:",
        MessageKey::RequestOtpHint => "Request a code by email, then verify it:",
        MessageKey::MoreAvailable => "more available",
        MessageKey::Selected => "Selected",
        MessageKey::Assets => "Assets",
        MessageKey::OpenMaintenance => "Open maintenance",
        MessageKey::LabUsage => "Lab usage",
        MessageKey::ByRoom => "By room",
    }
}

const fn vietnamese(key: MessageKey) -> &'static str {
    match key {
        MessageKey::Loading => "Đang tải…",
        MessageKey::NoRows => "Không có dữ liệu",
        MessageKey::LoadFailed => "Không thể tải dữ liệu",
        MessageKey::LoginSucceeded => "Đăng nhập thành công",
        MessageKey::LoggedOut => "Đã đăng xuất",
        MessageKey::TwoFactorRequired => "Cần xác thực hai lớp",
        MessageKey::SessionMissing => "Chưa đăng nhập. Hãy chạy `labdesk login` trước.",
        MessageKey::PasswordChanged => "Đã đổi mật khẩu",
        MessageKey::ResetCodeSent => "Mã đặt lại đã được gửi tới email của bạn",
        MessageKey::ResetCodeValid => "Mã đặt lại hợp lệ",
        MessageKey::PasswordReset => "Đã đặt lại mật khẩu. Bạn có thể đăng nhập.",
        MessageKey::OtpSent => "Mã xác thực đã được gửi tới email của bạn",
        MessageKey::OtpVerified => "Xác thực thành công",
        MessageKey::ProfileUpdated => "Đã cập nhật hồ sơ",
        MessageKey::TwoFactorToggled => "Đã cập nhật xác thực hai lớp",
        MessageKey::Registered => "Đã tạo tài khoản. Hãy kiểm tra email để kích hoạt.",
        MessageKey::UploadSucceeded => "Đã tải ảnh lên",
        MessageKey::ScanQrHint => "Quét mã QR, sau đó xác thực:",
        MessageKey::RequestOtpHint => "Yêu cầu mã qua email, sau đó xác thực:",
        MessageKey::MoreAvailable => "còn nữa",
        MessageKey::Selected => "Đã chọn",
        MessageKey::Assets => "Tài sản",
        MessageKey::OpenMaintenance => "Bảo trì đang mở",
        MessageKey::LabUsage => "Sử dụng phòng lab",
        MessageKey::ByRoom => "Theo phòng",
    }
}

fn capitalize(s: &mut String) {
    if let Some(first) = s.chars().next() {
        let upper: String = first.to_uppercase().collect();
        s.replace_range(..first.len_utf8(), &upper);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tags() {
        assert_eq!(Locale::parse("vi_VN.UTF-8"), Some(Locale::Vi));
        assert_eq!(Locale::parse("en-US"), Some(Locale::En));
        assert_eq!(Locale::parse("C"), Some(Locale::En));
        assert_eq!(Locale::parse("fr_FR"), None);
    }

    #[test]
    fn lc_all_wins_over_lang() {
        assert_eq!(Locale::detect_from(Some("vi_VN"), Some("en_US")), Locale::Vi);
        assert_eq!(Locale::detect_from(Some(""), Some("vi_VN")), Locale::Vi);
        assert_eq!(Locale::detect_from(None, None), Locale::En);
        assert_eq!(Locale::detect_from(Some("de_DE"), Some("vi")), Locale::Vi);
    }

    #[test]
    fn explicit_locale_resolves_without_env() {
        assert_eq!(Locale::resolve("vi"), Locale::Vi);
        assert_eq!(Locale::resolve("en"), Locale::En);
    }

    #[test]
    fn mutation_messages() {
        let en = Catalog::new(Locale::En);
        assert_eq!(
            en.mutation_succeeded(MutationKind::Duplicate, "asset"),
            "Asset duplicated successfully"
        );
        assert_eq!(
            en.mutation_failed(MutationKind::Delete, "room", "Room has assets"),
            "Failed to delete room: Room has assets"
        );
        let vi = Catalog::new(Locale::Vi);
        assert_eq!(
            vi.mutation_succeeded(MutationKind::Create, "room"),
            "Tạo phòng thành công"
        );
    }

    #[test]
    fn every_key_has_both_languages() {
        let keys = [
            MessageKey::Loading,
            MessageKey::NoRows,
            MessageKey::LoadFailed,
            MessageKey::LoginSucceeded,
            MessageKey::LoggedOut,
            MessageKey::TwoFactorRequired,
            MessageKey::SessionMissing,
            MessageKey::PasswordChanged,
            MessageKey::ResetCodeSent,
            MessageKey::ResetCodeValid,
            MessageKey::PasswordReset,
            MessageKey::OtpSent,
            MessageKey::OtpVerified,
            MessageKey::ProfileUpdated,
            MessageKey::TwoFactorToggled,
            MessageKey::Registered,
            MessageKey::UploadSucceeded,
            MessageKey::ScanQrHint,
            MessageKey::RequestOtpHint,
            MessageKey::MoreAvailable,
            MessageKey::Selected,
            MessageKey::Assets,
            MessageKey::OpenMaintenance,
            MessageKey::LabUsage,
            MessageKey::ByRoom,
        ];
        for key in keys {
            let en = Catalog::new(Locale::En).text(key);
            let vi = Catalog::new(Locale::Vi).text(key);
            assert!(!en.is_empty());
            assert_ne!(en, vi, "{key:?} is untranslated");
        }
    }

    #[test]
    fn page_position_is_one_based() {
        let en = Catalog::new(Locale::En);
        assert_eq!(en.page_position(1, 3), "Page 2 of 3");
        assert_eq!(en.page_position(0, 0), "Page 1 of 1");
        assert_eq!(en.total_rows(1), "1 row");
    }

    #[test]
    fn cli_summaries_follow_locale() {
        let en = Catalog::new(Locale::En);
        let vi = Catalog::new(Locale::Vi);
        assert_eq!(en.loaded_of(12, 40), "12 of 40 rows");
        assert_eq!(vi.loaded_of(12, 40), "12/40 dòng");
        assert_eq!(en.borrowings(3, 1), "Borrowings: 3 active, 1 overdue");
        assert!(vi.borrowings(3, 1).starts_with("Phiếu mượn: 3"));
        assert_eq!(vi.text(MessageKey::ByRoom), "Theo phòng");
    }
}
