//! Localized edit summaries and message templates.
//!
//! Tables are `(language code, template)` pairs. Templates use `%s` for a
//! string argument and `%d` for a number, filled in order by [`format_message`].

pub type MessageTable = &'static [(&'static str, &'static str)];

pub const FALLBACK_LANG: &str = "en";

/// Look up the template for `lang`, falling back to English and then to the first entry.
/// Returns `None` only when the table is empty.
pub fn translate(table: MessageTable, lang: &str) -> Option<&'static str> {
    if let Some((_, text)) = table.iter().find(|(code, _)| *code == lang) {
        return Some(*text);
    }
    let fallback = table
        .iter()
        .find(|(code, _)| *code == FALLBACK_LANG)
        .or_else(|| table.first())
        .map(|(_, text)| *text);
    match fallback {
        Some(text) => {
            tracing::warn!(lang, fallback = text, "no localized message, using fallback");
            Some(text)
        }
        None => {
            tracing::warn!(lang, "message table is empty");
            None
        }
    }
}

/// Translate and format in one step. A missing template yields an empty string.
pub fn message(table: MessageTable, lang: &str, args: &[&str]) -> String {
    translate(table, lang)
        .map(|template| format_message(template, args))
        .unwrap_or_default()
}

pub fn format_message(template: &str, args: &[&str]) -> String {
    let mut output = String::with_capacity(template.len() + 32);
    let mut remaining = args.iter();
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '%' {
            match chars.peek() {
                Some('s') | Some('d') => {
                    chars.next();
                    if let Some(arg) = remaining.next() {
                        output.push_str(arg);
                    }
                    continue;
                }
                Some('%') => {
                    chars.next();
                    output.push('%');
                    continue;
                }
                _ => {}
            }
        }
        output.push(ch);
    }
    output
}

pub const CATEGORY_ADD_SUMMARY: MessageTable = &[
    ("da", "Robot: Tilføjer [[%s]]"),
    ("de", "Bot: Ergänze [[%s]]"),
    ("en", "Robot: Adding [[%s]]"),
    ("es", "Bot: Añadida [[%s]]"),
    ("fi", "Botti lisäsi luokkaan [[%s]]"),
    ("fr", "Robot : ajoute [[%s]]"),
    ("ia", "Robot: Addition de [[%s]]"),
    ("is", "Vélmenni: Bæti við [[%s]]"),
    ("no", "Robot: Legger til [[%s]]"),
    ("pt", "Bot: Adicionando [[%s]]"),
];

pub const CATEGORY_CHANGE_SUMMARY: MessageTable = &[
    ("da", "Robot: Ændrer %s"),
    ("de", "Bot: Ändere %s"),
    ("en", "Robot: Changing %s"),
    ("es", "Bot: Cambiada %s"),
    ("fi", "Botti vaihtoi luokan %s"),
    ("fr", "Robot : modifie %s"),
    ("ia", "Robot: Modification de %s"),
    ("is", "Vélmenni: Breyti flokknum [[%s]]"),
    ("nl", "Bot: Wijziging %s"),
    ("no", "Robot: Endrer %s"),
    ("pt", "Bot: Modificando [[%s]]"),
];

pub const CATEGORY_REMOVE_SUMMARY: MessageTable = &[
    ("da", "Robot: Fjerner fra %s"),
    ("de", "Bot: Entferne aus %s"),
    ("en", "Robot: Removing from %s"),
    ("es", "Bot: Eliminada de la %s"),
    ("ia", "Robot: Eliminate de %s"),
    ("is", "Vélmenni: Fjarlægi [[%s]]"),
    ("nl", "Bot: Verwijderd uit %s"),
    ("pt", "Bot: Removendo [[%s]]"),
];

pub const CATEGORY_COPY_SUMMARY: MessageTable = &[
    ("de", "Bot: Kategorie von %s verschoben"),
    ("en", "Robot: Moved from %s"),
    ("fr", "Robot : déplacée depuis %s"),
];

pub const DELETION_REASON_MOVE: MessageTable = &[
    ("de", "Bot: Kategorie wurde nach %s verschoben"),
    ("en", "Robot: Category was moved to %s"),
    ("fr", "Robot : catégorie déplacée sur %s"),
    ("ia", "Robot: Categoria transferite a %s"),
    ("no", "Robot: Kategorien ble flyttet til %s"),
    ("pt", "Bot: Categoria %s foi movida"),
];

pub const DELETION_REASON_REMOVE: MessageTable = &[
    ("de", "Bot: Kategorie wurde aufgelöst"),
    ("en", "Robot: Category was disbanded"),
    ("ia", "Robot: Categoria esseva dissolvite"),
];

pub const ALSO_IN_CATEGORIES: MessageTable = &[
    ("da", "(også i %s)"),
    ("de", "(auch in %s)"),
    ("en", "(also in %s)"),
    ("fr", "(également dans %s)"),
    ("ia", "(equalmente in %s)"),
    ("is", "(einnig í %s)"),
    ("pt", "(também em %s)"),
];

pub const ADD_TEXT_SUMMARY: MessageTable = &[
    ("cs", "Robot přidal %s"),
    ("de", "Bot: \"%s\" hinzugefügt"),
    ("en", "Bot: Adding %s"),
    ("fr", "Robot : Ajoute %s"),
    ("it", "Bot: Aggiungo %s"),
    ("nn", "Robot: La til %s"),
    ("pl", "Robot dodaje: %s"),
    ("pt", "Bot: Adicionando %s"),
    ("ru", "Бот: добавление %s"),
    ("sv", "Bot: Lägger till %s"),
];

pub const WELCOME_LOGBOOK: MessageTable = &[
    ("en", "Project:Welcome log"),
    ("fa", "Project:سیاهه خوشامد"),
    ("it", "Project:Benvenuto Bot/Log"),
    ("ko", "Project:Welcome log"),
    ("nl", "Project:Logboek welkom"),
    ("no", "Project:Velkomstlogg"),
];

/// Languages whose wiki keeps no welcome log.
pub const WELCOME_LOGBOOK_DISABLED: &[&str] = &["da", "de", "he", "id", "ka", "pt", "ru", "vo"];

pub const WELCOME_SUMMARY: MessageTable = &[
    ("de", "Herzlich willkommen!"),
    ("en", "Welcome!"),
    ("fr", "Bienvenue !"),
    ("it", "Benvenuto!"),
    ("nl", "Welkom!"),
    ("no", "Velkommen!"),
];

pub const WELCOME_TEXT: MessageTable = &[
    ("de", "{{subst:Hallo}} %s"),
    ("en", "{{subst:welcome}} %s"),
    ("fr", "{{subst:Bienvenue}} %s"),
    ("it", "<!-- inizio template di benvenuto -->\n{{subst:Benvebot}} %s"),
    ("nl", "{{hola|bot|%s}}"),
    ("no", "{{subst:bruker:jhs/vk}} %s"),
];

pub const WELCOME_LOG_SUMMARY: MessageTable = &[
    ("de", "Aktualisiere Logdatei"),
    ("en", "Updating log"),
    ("it", "Aggiorno il log"),
    ("nl", "Logboek bijwerken"),
    ("no", "Oppdaterer logg"),
];

pub const WELCOME_REPORT_PAGE: MessageTable = &[
    ("de", "Benutzer:Filnik/Report"),
    ("en", "Project:Administrator intervention against vandalism"),
    ("it", "Project:Benvenuto_Bot/Report"),
];

pub const WELCOME_REPORT_SUMMARY: MessageTable = &[
    ("de", "Ergänze zu überprüfenden Benutzernamen"),
    ("en", "Adding a username that needs to be checked"),
    ("it", "Aggiunto utente da controllare"),
];

pub const WELCOME_REPORT_TEXT: MessageTable = &[
    ("de", "\n*[[Benutzer Diskussion:%s]]  ~~~~~"),
    ("en", "\n*{{Userlinks|%s}}  ~~~~~"),
    ("it", "\n{{Reported|%s}}"),
];

pub const WELCOME_BAD_WORD_PAGE: MessageTable = &[
    ("en", "Project:Welcome log/Bad_names"),
    ("it", "Project:Benvenuto_Bot/Lista_Badwords"),
];

pub const WELCOME_WHITELIST_PAGE: MessageTable = &[
    ("en", "Project:Welcome log/Whitelist"),
    ("it", "Project:Benvenuto_Bot/Lista_Whitewords"),
];

pub const WELCOME_SIGNATURE_PAGE: MessageTable = &[
    ("en", "Project:Welcome log/Sign"),
    ("it", "Project:Benvenuto_Bot/Firme"),
];

pub const WELCOME_LOG_HEADER: &str = "{|border=\"2\" cellpadding=\"4\" cellspacing=\"0\" style=\"margin: 0.5em 0.5em 0.5em 1em; padding: 0.5em; background: #bfcda5; border: 1px #b6fd2c solid; border-collapse: collapse; font-size: 95%;\"";
