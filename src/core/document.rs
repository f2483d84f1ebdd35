use crate::core::sow::SowRequest;
use crate::domain::model::SowType;
use crate::utils::error::Result;
use std::io::Write;
use zip::write::{SimpleFileOptions, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:pPr><w:spacing w:after="120"/></w:pPr><w:rPr><w:sz w:val="22"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:rPr><w:b/><w:sz w:val="52"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:keepNext/><w:spacing w:before="480"/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:color w:val="365F91"/><w:sz w:val="28"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:keepNext/><w:spacing w:before="200"/><w:outlineLvl w:val="1"/></w:pPr><w:rPr><w:b/><w:color w:val="4F81BD"/><w:sz w:val="26"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading3"><w:name w:val="heading 3"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:keepNext/><w:outlineLvl w:val="2"/></w:pPr><w:rPr><w:b/><w:color w:val="4F81BD"/></w:rPr></w:style><w:style w:type="table" w:styleId="TableGrid"><w:name w:val="Table Grid"/><w:tblPr><w:tblBorders><w:top w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:left w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:bottom w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:right w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:insideH w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:insideV w:val="single" w:sz="4" w:space="0" w:color="auto"/></w:tblBorders></w:tblPr></w:style></w:styles>"#;

#[derive(Debug, Clone, PartialEq)]
enum Block {
    Heading { text: String, level: u8 },
    Paragraph(String),
    Table(Vec<Vec<String>>),
}

#[derive(Debug, Clone, Default)]
pub struct DocxDocument {
    blocks: Vec<Block>,
}

impl DocxDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// level 0 為 Title，1..=9 對應 Heading1..Heading9
    pub fn add_heading(&mut self, text: impl Into<String>, level: u8) -> &mut Self {
        self.blocks.push(Block::Heading {
            text: text.into(),
            level: level.min(9),
        });
        self
    }

    pub fn add_paragraph(&mut self, text: impl Into<String>) -> &mut Self {
        self.blocks.push(Block::Paragraph(text.into()));
        self
    }

    /// 每列欄位數不同時，以最寬的一列為準補空白格
    pub fn add_table(&mut self, rows: Vec<Vec<String>>) -> &mut Self {
        self.blocks.push(Block::Table(rows));
        self
    }

    pub fn document_xml(&self) -> String {
        let mut body = String::new();
        for block in &self.blocks {
            match block {
                Block::Heading { text, level } => {
                    let style = if *level == 0 {
                        "Title".to_string()
                    } else {
                        format!("Heading{}", level)
                    };
                    body.push_str(&paragraph_xml(text, Some(&style)));
                }
                Block::Paragraph(text) => body.push_str(&paragraph_xml(text, None)),
                Block::Table(rows) => body.push_str(&table_xml(rows)),
            }
        }

        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
             <w:body>{}<w:sectPr><w:pgSz w:w=\"12240\" w:h=\"15840\"/>\
             <w:pgMar w:top=\"1440\" w:right=\"1440\" w:bottom=\"1440\" w:left=\"1440\" w:header=\"720\" w:footer=\"720\" w:gutter=\"0\"/>\
             </w:sectPr></w:body></w:document>",
            body
        )
    }

    /// 將文件打包成 .docx 位元組
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        let parts = [
            ("[Content_Types].xml", CONTENT_TYPES.to_string()),
            ("_rels/.rels", PACKAGE_RELS.to_string()),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS.to_string()),
            ("word/styles.xml", STYLES.to_string()),
            ("word/document.xml", self.document_xml()),
        ];
        for (name, content) in parts {
            zip.start_file(name, options)?;
            zip.write_all(content.as_bytes())?;
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

fn paragraph_xml(text: &str, style: Option<&str>) -> String {
    let mut xml = String::from("<w:p>");
    if let Some(style) = style {
        xml.push_str(&format!("<w:pPr><w:pStyle w:val=\"{}\"/></w:pPr>", style));
    }
    xml.push_str("<w:r>");
    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            xml.push_str("<w:br/>");
        }
        xml.push_str(&format!(
            "<w:t xml:space=\"preserve\">{}</w:t>",
            escape_xml(line.trim_end_matches('\r'))
        ));
    }
    xml.push_str("</w:r></w:p>");
    xml
}

fn table_xml(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);

    let mut xml = String::from(
        "<w:tbl><w:tblPr><w:tblStyle w:val=\"TableGrid\"/><w:tblW w:w=\"0\" w:type=\"auto\"/></w:tblPr><w:tblGrid>",
    );
    for _ in 0..columns {
        xml.push_str("<w:gridCol/>");
    }
    xml.push_str("</w:tblGrid>");

    for row in rows {
        xml.push_str("<w:tr>");
        for column in 0..columns {
            let cell = row.get(column).map(String::as_str).unwrap_or_default();
            xml.push_str("<w:tc><w:tcPr><w:tcW w:w=\"0\" w:type=\"auto\"/></w:tcPr>");
            xml.push_str(&paragraph_xml(cell, None));
            xml.push_str("</w:tc>");
        }
        xml.push_str("</w:tr>");
    }
    xml.push_str("</w:tbl>");
    xml
}

pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            // XML 1.0 不允許的控制字元直接略過
            c if (c as u32) < 0x20 && c != '\t' => {}
            c => escaped.push(c),
        }
    }
    escaped
}

/// SOW 下載文件的版面：基本資料、時程、預算、類型區塊，最後是生成內容
pub fn sow_document(request: &SowRequest, sow_text: &str) -> DocxDocument {
    let mut doc = DocxDocument::new();
    doc.add_heading(request.project_title.as_str(), 1);
    doc.add_heading("Client Name:", 2);
    doc.add_paragraph(request.client_name.as_str());
    doc.add_heading("Project Description:", 2);
    doc.add_paragraph(request.project_description.as_str());

    doc.add_heading("Timeline:", 2);
    doc.add_table(vec![
        vec!["Start Date".to_string(), "End Date".to_string()],
        vec![request.start_date.to_string(), request.end_date.to_string()],
    ]);

    doc.add_heading("Budget:", 2);
    doc.add_table(vec![vec!["Total Budget".to_string(), request.budget.clone()]]);

    match request.sow_type {
        SowType::TimeAndMaterials => {
            doc.add_heading("Roles & Rates:", 2);
            for role in &request.roles {
                doc.add_paragraph(format!("{}: {}", role.role, role.rate));
            }
        }
        SowType::ManagedCapacity => {
            doc.add_heading("Unit of Work & Pricing:", 2);
            for role in &request.roles {
                doc.add_paragraph(format!("{}: {}", role.role, role.rate));
            }
        }
        SowType::FixedBid => {
            doc.add_heading("Milestones & Payment Schedule:", 2);
            doc.add_paragraph(
                "Milestone-based payment schedule tied to the completion of key deliverables.",
            );
        }
        SowType::ManagedServices => {
            doc.add_heading("Scope & SLAs:", 2);
            doc.add_paragraph(
                "Scope of services, number of tickets, and SLA details with associated penalties.",
            );
        }
    }

    doc.add_heading("Statement of Work:", 2);
    doc.add_paragraph(sow_text);
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{RoleRate, SowForm};
    use std::io::Read;

    fn request(sow_type: SowType) -> SowRequest {
        let form = SowForm {
            project_title: Some("R&D <Portal>".to_string()),
            client_name: Some("Acme".to_string()),
            project_description: Some("Build it".to_string()),
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-06-30".to_string()),
            budget: Some("$10k".to_string()),
            sow_type: Some(sow_type),
            roles: vec![RoleRate::new("Developer", "$90/hour")],
            ..Default::default()
        };
        SowRequest::from_form(&form).unwrap()
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a & b < c > \"d\" 'e'"), "a &amp; b &lt; c &gt; &quot;d&quot; &apos;e&apos;");
        assert_eq!(escape_xml("bell\u{7}"), "bell");
    }

    #[test]
    fn test_multiline_paragraph_uses_breaks() {
        let mut doc = DocxDocument::new();
        doc.add_paragraph("line one\nline two");
        let xml = doc.document_xml();
        assert!(xml.contains("line one</w:t><w:br/><w:t xml:space=\"preserve\">line two"));
    }

    #[test]
    fn test_ragged_table_is_padded() {
        let mut doc = DocxDocument::new();
        doc.add_table(vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string()],
        ]);
        let xml = doc.document_xml();
        assert_eq!(xml.matches("<w:tc>").count(), 4);
        assert_eq!(xml.matches("<w:gridCol/>").count(), 2);
    }

    #[test]
    fn test_package_contains_all_parts() {
        let bytes = sow_document(&request(SowType::FixedBid), "Generated body").to_bytes().unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();

        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "word/_rels/document.xml.rels",
            "word/styles.xml",
            "word/document.xml",
        ] {
            assert!(archive.by_name(part).is_ok(), "missing part {}", part);
        }

        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        assert!(xml.contains("R&amp;D &lt;Portal&gt;"));
        assert!(xml.contains("Milestones &amp; Payment Schedule:"));
        assert!(xml.contains("Generated body"));
    }

    #[test]
    fn test_type_specific_blocks() {
        let tm = sow_document(&request(SowType::TimeAndMaterials), "x").document_xml();
        assert!(tm.contains("Roles &amp; Rates:"));
        assert!(tm.contains("Developer: $90/hour"));

        let mc = sow_document(&request(SowType::ManagedCapacity), "x").document_xml();
        assert!(mc.contains("Unit of Work &amp; Pricing:"));

        let ms = sow_document(&request(SowType::ManagedServices), "x").document_xml();
        assert!(ms.contains("Scope &amp; SLAs:"));
        assert!(!ms.contains("Developer"));
    }
}
