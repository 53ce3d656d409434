use crate::kind::MemberType;

/// Infers the [`MemberType`] of a member id being added to a container.
///
/// The repository overrides the classification with
/// [`MemberType::Container`] when the id names an existing container, so
/// classifiers only need to tell RDF sources from binaries.
pub trait MemberClassifier: Send + Sync {
    fn classify(&self, container_id: &str, member_id: &str) -> MemberType;
}

/// File extensions treated as non-RDF content by [`DefaultClassifier`].
const BINARY_EXTENSIONS: &[&str] = &[
    "bin", "gif", "gz", "jpeg", "jpg", "mp3", "mp4", "pdf", "png", "svg", "tar", "webp", "zip",
];

/// Classifies by extension: known binary extensions are [`MemberType::Binary`],
/// everything else is a [`MemberType::Resource`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultClassifier;

impl MemberClassifier for DefaultClassifier {
    fn classify(&self, _container_id: &str, member_id: &str) -> MemberType {
        let ext = member_id
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match ext {
            Some(ext) if BINARY_EXTENSIONS.contains(&ext.as_str()) => MemberType::Binary,
            _ => MemberType::Resource,
        }
    }
}

impl<F> MemberClassifier for F
where
    F: Fn(&str, &str) -> MemberType + Send + Sync,
{
    fn classify(&self, container_id: &str, member_id: &str) -> MemberType {
        self(container_id, member_id)
    }
}
