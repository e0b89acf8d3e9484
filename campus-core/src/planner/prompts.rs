use chrono::NaiveDate;

use crate::config::{ColumnSection, SchemaSection};

/// Table description injected into the relevance and SQL prompts.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescription {
    pub table: String,
    pub dialect: String,
    pub columns: Vec<ColumnSection>,
}

impl From<&SchemaSection> for SchemaDescription {
    fn from(section: &SchemaSection) -> Self {
        Self {
            table: section.table.clone(),
            dialect: section.dialect.clone(),
            columns: section.columns.clone(),
        }
    }
}

impl SchemaDescription {
    /// The `edt` timetable table created by `sql/schedule.sql`.
    pub fn timetable() -> Self {
        let column = |name: &str, description: &str, partial_match: bool| ColumnSection {
            name: name.to_string(),
            description: description.to_string(),
            partial_match,
        };
        Self {
            table: "edt".to_string(),
            dialect: "SQLite".to_string(),
            columns: vec![
                column("id", "identifiant unique, clé primaire, représentant l'ordre chronologique d'enregistrement des cours", false),
                column("type", "type du cours (CM, TD, TP, etc.)", false),
                column("start", "date et heure de début du cours (ISO 8601)", false),
                column("end", "date et heure de fin du cours (ISO 8601) ; mot réservé, à écrire \"end\" entre guillemets doubles", false),
                column("course", "nom du cours", false),
                column("room", "salle dans laquelle a lieu le cours", false),
                column("building", "bâtiment dans lequel se trouve la salle", false),
                column("program", "les formations concernées par le cours, plusieurs valeurs concaténées séparées par ';'", true),
                column("module", "le module qui regroupe le cours", false),
            ],
        }
    }

    pub fn render_columns(&self) -> String {
        self.columns
            .iter()
            .map(|column| format!("    - {} : {}", column.name, column.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn partial_match_rule(&self) -> Option<String> {
        let names: Vec<&str> = self
            .columns
            .iter()
            .filter(|column| column.partial_match)
            .map(|column| column.name.as_str())
            .collect();
        if names.is_empty() {
            return None;
        }
        Some(format!(
            "- Si la question concerne la colonne {}, utilise LIKE '%valeur%' au lieu d'une égalité stricte (=), car cette colonne peut contenir plusieurs valeurs concaténées.",
            names.join(" ou ")
        ))
    }
}

pub fn relevance_system(schema: &SchemaDescription) -> String {
    format!(
        "Tu es un assistant qui détermine si une question donnée est liée à la table {table} dont le schéma est le suivant :\n{columns}\nRéponds SEULEMENT \"relevant\" ou \"not_relevant\".",
        table = schema.table,
        columns = schema.render_columns(),
    )
}

pub fn text_to_sql_system(schema: &SchemaDescription, today: NaiveDate) -> String {
    let mut rules = vec![
        "- Ne limite PAS les résultats avec LIMIT sauf si la question l'exige clairement.".to_string(),
    ];
    if let Some(rule) = schema.partial_match_rule() {
        rules.push(rule);
    }
    rules.push("- Si une question porte sur les lieux des cours, assure-toi d'inclure à la fois la salle et le bâtiment dans les résultats.".to_string());
    rules.push("- Ne produis aucune requête de modification de données (INSERT, UPDATE, DELETE, DROP, etc.) : uniquement une seule requête SELECT.".to_string());
    rules.push("- Retourne exclusivement la requête SQL, sans explication ni commentaire.".to_string());
    format!(
        "Tu es un assistant chargé de convertir des questions en langage naturel en requêtes SQL valides pour une base de données {dialect}.\n\
         Nous sommes le {today}.\n\
         Tu interroges uniquement la table appelée {table}, dont le schéma est le suivant :\n{columns}\n\n\
         Règles à respecter :\n{rules}",
        dialect = schema.dialect,
        today = today.format("%Y-%m-%d"),
        table = schema.table,
        columns = schema.render_columns(),
        rules = rules.join("\n"),
    )
}

pub fn rewrite_system(today: NaiveDate) -> String {
    format!(
        "Tu es un assistant qui reformule une question originale pour permettre des requêtes SQL plus précises. \
         Assure-toi que tous les détails nécessaires, tels que les jointures de tables, sont préservés afin de récupérer des données complètes et précises. \
         Nous sommes le {today}. Si la date et l'heure ne sont pas précisées dans une question qui concerne une période précise, ajoute-les. \
         Par exemple pour \"A quelle heure ai-je cours demain ?\", tu dois transformer le \"demain\" en une date précise.",
        today = today.format("%Y-%m-%d"),
    )
}

pub fn rewrite_user(question: &str) -> String {
    format!(
        "Question originale : {question}\nReformule la question pour permettre des requêtes SQL plus précises, en veillant à ce que tous les détails nécessaires soient préservés."
    )
}

pub const ANSWER_SYSTEM: &str =
    "Tu es un assistant intelligent qui convertit les résultats d'une requête SQL en réponse claire et naturelle.";

pub const ANSWER_ERROR: &str =
    "Formule un message d'erreur clair et compréhensible en une seule phrase informant l'utilisateur du problème.";

pub const ANSWER_EMPTY: &str =
    "Formule une réponse claire et compréhensible à la question initiale en une seule phrase, et mentionne qu'aucune donnée n'a été trouvée.";

pub const ANSWER_ROWS: &str =
    "Formule une réponse claire et compréhensible à la question initiale en une seule phrase en utilisant les données récupérées par la requête SQL.";

pub const ANSWER_CONFIRMATION: &str =
    "Formule un message de confirmation clair et compréhensible en une seule phrase, commençant par confirmer que la demande de l'utilisateur a été traitée avec succès.";

pub const OFF_TOPIC_SYSTEM: &str =
    "Tu es un assistant charmant et drôle qui répond de manière ludique à une question hors sujet. L'utilisateur est censé poser des questions relatives à l'emploi du temps de son université.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_prompt_lists_schema_and_partial_match_rule() {
        let schema = SchemaDescription::timetable();
        let prompt = text_to_sql_system(&schema, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert!(prompt.contains("table appelée edt"));
        assert!(prompt.contains("- program :"));
        assert!(prompt.contains("colonne program, utilise LIKE '%valeur%'"));
        assert!(prompt.contains("Nous sommes le 2025-03-10"));
        assert!(prompt.contains("uniquement une seule requête SELECT"));
    }

    #[test]
    fn schema_without_partial_columns_omits_like_rule() {
        let mut schema = SchemaDescription::timetable();
        for column in &mut schema.columns {
            column.partial_match = false;
        }
        schema.table = "planning".into();
        let prompt = text_to_sql_system(&schema, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert!(!prompt.contains("LIKE"));
        assert!(relevance_system(&schema).contains("table planning"));
    }
}
