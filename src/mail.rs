//! Payload builder for the `email/send` endpoint.
//!
//! [`MailSend`] assembles the JSON body for a message: addressing, subject,
//! bodies, custom headers and attachments. It implements
//! [`BuildsRequest`](crate::BuildsRequest), so it plugs straight into
//! [`Smtp2goClient::send`](crate::Smtp2goClient::send).

use std::io;
use std::path::Path;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::service::BuildsRequest;

const ENDPOINT: &str = "email/send";

/// Header names RFC 5322 allows to appear more than once in a message.
const ALLOWED_MULTIPLE_HEADERS: [&str; 11] = [
    "comments",
    "keywords",
    "optional-field",
    "trace",
    "resent-date",
    "resent-from",
    "resent-sender",
    "resent-to",
    "resent-cc",
    "resent-bcc",
    "resent-msg-id",
];

/// One mailbox: an email address with an optional display name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Address {
    email: String,
    name: Option<String>,
}

impl Address {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Renders the mailbox for the wire. With a display name the email is
    /// stripped of angle brackets and wrapped in a fresh pair; `quoted`
    /// additionally puts the name in double quotes, as sender lines want.
    fn format(&self, quoted: bool) -> String {
        match &self.name {
            None => self.email.clone(),
            Some(name) => {
                let email = self.email.replace(['<', '>'], "");
                if quoted {
                    format!("\"{name}\" <{email}>")
                } else {
                    format!("{name} <{email}>")
                }
            }
        }
    }
}

/// Recipient field an address goes into.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressKind {
    To,
    Cc,
    Bcc,
}

/// One custom message header.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CustomHeader {
    header: String,
    value: String,
}

impl CustomHeader {
    pub fn new(header: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            value: value.into(),
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Custom headers with single-occurrence enforcement.
///
/// Adding a header that may occur only once replaces the value of an
/// existing entry with the same name (compared case-insensitively) instead
/// of appending a duplicate.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CustomHeaders {
    items: Vec<CustomHeader>,
}

impl CustomHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, header: CustomHeader) -> &mut Self {
        let name = header.header.to_ascii_lowercase();
        if ALLOWED_MULTIPLE_HEADERS.contains(&name.as_str()) {
            self.items.push(header);
            return self;
        }
        match self
            .items
            .iter_mut()
            .find(|existing| existing.header.eq_ignore_ascii_case(&header.header))
        {
            Some(existing) => existing.value = header.value,
            None => self.items.push(header),
        }
        self
    }

    pub fn as_slice(&self) -> &[CustomHeader] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<CustomHeader> for CustomHeaders {
    fn from_iter<I: IntoIterator<Item = CustomHeader>>(iter: I) -> Self {
        let mut headers = Self::new();
        for header in iter {
            headers.add(header);
        }
        headers
    }
}

/// A file carried by the message. The payload travels base64-encoded.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Attachment {
    filename: String,
    fileblob: String,
    mimetype: String,
}

impl Attachment {
    /// Reads `path` and prepares it as an attachment named after the file.
    /// The MIME type comes from the extension, falling back to
    /// `application/octet-stream`.
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::from_bytes(filename, data))
    }

    /// Prepares in-memory `data` as an attachment. The MIME type comes from
    /// the extension of `filename`.
    pub fn from_bytes(filename: impl Into<String>, data: impl AsRef<[u8]>) -> Self {
        let filename = filename.into();
        let mimetype = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();
        Self {
            filename,
            fileblob: BASE64.encode(data.as_ref()),
            mimetype,
        }
    }

    /// Renames the attachment as seen by recipients.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Overrides the guessed MIME type.
    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = mimetype.into();
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn mimetype(&self) -> &str {
        &self.mimetype
    }

    pub fn fileblob(&self) -> &str {
        &self.fileblob
    }
}

/// Builds the body for a message dispatch.
///
/// Recipient and sender lines are rendered to their wire form as they are
/// added; only populated fields end up in the JSON body.
#[derive(Clone, Debug)]
pub struct MailSend {
    sender: String,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    subject: String,
    html_body: String,
    text_body: String,
    template_id: Option<String>,
    template_data: Map<String, Value>,
    custom_headers: CustomHeaders,
    attachments: Vec<Attachment>,
    inlines: Vec<Attachment>,
    version: u32,
}

impl MailSend {
    pub fn new(
        sender: Address,
        recipients: impl IntoIterator<Item = Address>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let mut mail = Self {
            sender: String::new(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            html_body: String::new(),
            text_body: String::new(),
            template_id: None,
            template_data: Map::new(),
            custom_headers: CustomHeaders::new(),
            attachments: Vec::new(),
            inlines: Vec::new(),
            version: 1,
        };
        mail.set_sender(sender);
        for recipient in recipients {
            mail.add_address(AddressKind::To, recipient);
        }
        mail.set_body(body);
        mail
    }

    pub fn set_sender(&mut self, address: Address) -> &mut Self {
        self.sender = address.format(true);
        self
    }

    pub fn add_address(&mut self, kind: AddressKind, address: Address) -> &mut Self {
        let line = address.format(false);
        match kind {
            AddressKind::To => self.to.push(line),
            AddressKind::Cc => self.cc.push(line),
            AddressKind::Bcc => self.bcc.push(line),
        }
        self
    }

    /// Replaces every recipient of `kind`.
    pub fn set_addresses(
        &mut self,
        kind: AddressKind,
        addresses: impl IntoIterator<Item = Address>,
    ) -> &mut Self {
        match kind {
            AddressKind::To => self.to.clear(),
            AddressKind::Cc => self.cc.clear(),
            AddressKind::Bcc => self.bcc.clear(),
        }
        for address in addresses {
            self.add_address(kind, address);
        }
        self
    }

    /// Routes `body` by content: anything that looks like markup becomes
    /// the HTML body, plain text becomes the text body. The other part is
    /// cleared either way.
    pub fn set_body(&mut self, body: impl Into<String>) -> &mut Self {
        let body = body.into();
        self.html_body.clear();
        self.text_body.clear();
        if looks_like_markup(&body) {
            self.html_body = body;
        } else {
            self.text_body = body;
        }
        self
    }

    pub fn set_html_body(&mut self, body: impl Into<String>) -> &mut Self {
        self.html_body = body.into();
        self
    }

    pub fn set_text_body(&mut self, body: impl Into<String>) -> &mut Self {
        self.text_body = body.into();
        self
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) -> &mut Self {
        self.subject = subject.into();
        self
    }

    /// Selects a stored template instead of literal bodies.
    pub fn set_template_id(&mut self, template_id: impl Into<String>) -> &mut Self {
        self.template_id = Some(template_id.into());
        self
    }

    /// Variables substituted into the selected template.
    pub fn set_template_data(&mut self, data: Map<String, Value>) -> &mut Self {
        self.template_data = data;
        self
    }

    pub fn add_custom_header(&mut self, header: CustomHeader) -> &mut Self {
        self.custom_headers.add(header);
        self
    }

    pub fn set_custom_headers(&mut self, headers: CustomHeaders) -> &mut Self {
        self.custom_headers = headers;
        self
    }

    pub fn add_attachment(&mut self, attachment: Attachment) -> &mut Self {
        self.attachments.push(attachment);
        self
    }

    /// Adds an inline attachment, referenced from the HTML body by
    /// `cid:` and its filename.
    pub fn add_inline(&mut self, attachment: Attachment) -> &mut Self {
        self.inlines.push(attachment);
        self
    }

    pub fn set_version(&mut self, version: u32) -> &mut Self {
        self.version = version;
        self
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn to(&self) -> &[String] {
        &self.to
    }

    pub fn cc(&self) -> &[String] {
        &self.cc
    }

    pub fn bcc(&self) -> &[String] {
        &self.bcc
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn html_body(&self) -> &str {
        &self.html_body
    }

    pub fn text_body(&self) -> &str {
        &self.text_body
    }

    pub fn template_id(&self) -> Option<&str> {
        self.template_id.as_deref()
    }

    pub fn custom_headers(&self) -> &CustomHeaders {
        &self.custom_headers
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn inlines(&self) -> &[Attachment] {
        &self.inlines
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl BuildsRequest for MailSend {
    fn method(&self) -> Method {
        Method::POST
    }

    fn endpoint(&self) -> &str {
        ENDPOINT
    }

    /// Only populated fields are serialized; the API treats empty strings
    /// and empty lists as malformed rather than absent.
    fn build_request_body(&self) -> Map<String, Value> {
        let mut body = Map::new();
        if !self.to.is_empty() {
            body.insert("to".to_owned(), json!(self.to));
        }
        if !self.cc.is_empty() {
            body.insert("cc".to_owned(), json!(self.cc));
        }
        if !self.bcc.is_empty() {
            body.insert("bcc".to_owned(), json!(self.bcc));
        }
        if !self.sender.is_empty() {
            body.insert("sender".to_owned(), json!(self.sender));
        }
        if !self.subject.is_empty() {
            body.insert("subject".to_owned(), json!(self.subject));
        }
        if !self.html_body.is_empty() {
            body.insert("html_body".to_owned(), json!(self.html_body));
        }
        if !self.text_body.is_empty() {
            body.insert("text_body".to_owned(), json!(self.text_body));
        }
        if !self.custom_headers.is_empty() {
            body.insert("custom_headers".to_owned(), json!(self.custom_headers));
        }
        if !self.attachments.is_empty() {
            body.insert("attachments".to_owned(), json!(self.attachments));
        }
        if !self.inlines.is_empty() {
            body.insert("inlines".to_owned(), json!(self.inlines));
        }
        if let Some(template_id) = &self.template_id {
            body.insert("template_id".to_owned(), json!(template_id));
        }
        if !self.template_data.is_empty() {
            body.insert(
                "template_data".to_owned(),
                Value::Object(self.template_data.clone()),
            );
        }
        body.insert("version".to_owned(), json!(self.version));
        body
    }
}

/// Matches any angle-bracketed tag, opening or closing.
fn looks_like_markup(text: &str) -> bool {
    static MARKUP: OnceLock<Regex> = OnceLock::new();
    MARKUP
        .get_or_init(|| Regex::new(r"</?[^>]+>").expect("markup pattern is valid"))
        .is_match(text)
}
